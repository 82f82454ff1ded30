//! Task handlers.
//!
//! - `GET /api/v1/auth/mytasks` - tasks assigned to the caller across their teams
//! - `GET /api/v1/auth/tasks/:id` - one task with its comments
//! - `POST /api/v1/auth/tasks/:id/status` - change a task's status
//! - `POST /api/v1/auth/tasks/:id/comment` - comment on a task
//! - `POST /api/v1/auth/leader/tasks` - create a task (leader or admin)
//!
//! Request bodies are parsed by hand so malformed JSON is a 400, not 422.

use crate::auth::principal::Principal;
use crate::errors::BffError;
use crate::handlers::{call_context, my_teams, parse_body, parse_task_id, tasks_by_team};
use crate::middleware::BearerToken;
use crate::models::{
    is_valid_status, CommentRequest, CreateTaskRequest, MyTasksView, StatusCounts,
    StatusUpdateRequest, Task, TaskDetailView, UserView,
};
use crate::routes::AppState;
use crate::services::{Dependency, DownstreamError};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Acknowledgement for accepted writes.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

pub(crate) const ACK_OK: Ack = Ack { status: "ok" };

fn task_api_error(err: &DownstreamError) -> BffError {
    tracing::warn!(target: "bff.handlers.tasks", error = %err, "Task service call failed");
    BffError::downstream(&Dependency::TaskApi.to_string(), err)
}

/// Handler for GET /api/v1/auth/mytasks
///
/// `can_create` and `can_edit` are true for leaders and admins;
/// `can_status` is true for every caller that passed the gate.
#[instrument(skip_all, name = "bff.handlers.my_tasks")]
pub async fn get_my_tasks(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Extension(bearer): Extension<BearerToken>,
) -> Result<Json<MyTasksView>, BffError> {
    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);

    let teams = my_teams(&state, &ctx).await?;
    let mut by_team = tasks_by_team(&state, &ctx, &teams).await?;

    let tasks: Vec<Task> = teams
        .iter()
        .filter_map(|team| by_team.remove(&team.teamid))
        .flatten()
        .filter(|task| task.assignee == principal.username)
        .collect();

    let can_edit = principal.is_leader() || principal.is_admin();

    Ok(Json(MyTasksView {
        user: UserView::from(&principal),
        can_create: can_edit,
        can_edit,
        can_status: true,
        total_tasks: tasks.len(),
        status_counts: StatusCounts::tally(&tasks),
        tasks,
    }))
}

/// Handler for GET /api/v1/auth/tasks/:id
///
/// The task and its comments are fetched concurrently; either failing
/// fails the request.
///
/// # Response
///
/// - 200 OK: `{"task": {...}, "comments": [...]}`
/// - 400 Bad Request: id is not a positive integer
/// - 502/504: task service failure
#[instrument(skip_all, name = "bff.handlers.task_detail")]
pub async fn get_task_detail(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    Path(raw_id): Path<String>,
) -> Result<Json<TaskDetailView>, BffError> {
    let task_id = parse_task_id(&raw_id)?;
    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);

    let (task, comments) = tokio::try_join!(
        state.downstream.task_by_id(&ctx, task_id),
        state.downstream.comments_by_task(&ctx, task_id),
    )
    .map_err(|e| task_api_error(&e))?;

    Ok(Json(TaskDetailView { task, comments }))
}

/// Handler for POST /api/v1/auth/tasks/:id/status
///
/// Body: `{"status": "TODO" | "IN_PROGRESS" | "DONE"}`
#[instrument(skip_all, name = "bff.handlers.task_status")]
pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<Json<Ack>, BffError> {
    let task_id = parse_task_id(&raw_id)?;
    let request: StatusUpdateRequest = parse_body(&body)?;

    let status = request.status.trim();
    if !is_valid_status(status) {
        return Err(BffError::BadRequest("invalid status".to_string()));
    }

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .change_status(&ctx, task_id, status)
        .await
        .map_err(|e| task_api_error(&e))?;

    tracing::info!(target: "bff.handlers.tasks", task_id, status, "Task status changed");
    Ok(Json(ACK_OK))
}

/// Handler for POST /api/v1/auth/tasks/:id/comment
///
/// Body: `{"body": "..."}`, must not be blank. Returns 201 Created.
#[instrument(skip_all, name = "bff.handlers.add_comment")]
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), BffError> {
    let task_id = parse_task_id(&raw_id)?;
    let request: CommentRequest = parse_body(&body)?;

    let text = request.body.trim();
    if text.is_empty() {
        return Err(BffError::BadRequest("body required".to_string()));
    }

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .add_comment(&ctx, task_id, text)
        .await
        .map_err(|e| task_api_error(&e))?;

    Ok((StatusCode::CREATED, Json(ACK_OK)))
}

/// Handler for POST /api/v1/auth/leader/tasks
///
/// Routed behind the leader gate.
///
/// # Response
///
/// - 201 Created
/// - 400 Bad Request: invalid teamid, missing title or assignee, unknown
///   priority, or a deadline that is not `yyyy-mm-dd`
/// - 502/504: task service failure
#[instrument(skip_all, name = "bff.handlers.create_task")]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), BffError> {
    let request: CreateTaskRequest = parse_body(&body)?;
    let new_task = request
        .validate()
        .map_err(|reason| BffError::BadRequest(reason.to_string()))?;

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .create_task(&ctx, &new_task)
        .await
        .map_err(|e| task_api_error(&e))?;

    tracing::info!(
        target: "bff.handlers.tasks",
        team_id = new_task.teamid,
        priority = %new_task.priority,
        "Task created"
    );
    Ok((StatusCode::CREATED, Json(ACK_OK)))
}
