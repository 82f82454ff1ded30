//! Team management handlers.
//!
//! - `POST /api/v1/auth/leader/teams/edit` - rename or redescribe a team
//! - `POST /api/v1/auth/leader/teams/member/add` - add a member
//! - `POST /api/v1/auth/leader/teams/member/remove` - remove a member
//! - `POST /api/v1/auth/admin/teams/create` - create a team
//! - `POST /api/v1/auth/admin/teams/:teamid/delete` - delete a team
//!
//! Leader routes sit behind the leader gate and admin routes behind the
//! admin gate. Every team service failure is reported as TeamAPI.

use crate::errors::BffError;
use crate::handlers::tasks::{Ack, ACK_OK};
use crate::handlers::{call_context, parse_body, parse_team_id};
use crate::middleware::BearerToken;
use crate::models::{CreateTeamRequest, EditTeamRequest, MemberRequest};
use crate::routes::AppState;
use crate::services::{Dependency, DownstreamError};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

fn team_api_error(err: &DownstreamError) -> BffError {
    tracing::warn!(target: "bff.handlers.team_admin", error = %err, "Team service call failed");
    BffError::downstream(&Dependency::TeamApi.to_string(), err)
}

fn bad_request(reason: &str) -> BffError {
    BffError::BadRequest(reason.to_string())
}

/// Handler for POST /api/v1/auth/leader/teams/edit
///
/// Body: `{"teamid": N, "name": "...", "description": "..."}`
#[instrument(skip_all, name = "bff.handlers.edit_team")]
pub async fn edit_team(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    body: Bytes,
) -> Result<Json<Ack>, BffError> {
    let request: EditTeamRequest = parse_body(&body)?;
    let team = request.validate().map_err(bad_request)?;

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .edit_team(&ctx, &team)
        .await
        .map_err(|e| team_api_error(&e))?;

    tracing::info!(target: "bff.handlers.team_admin", team_id = team.teamid, "Team updated");
    Ok(Json(ACK_OK))
}

/// Handler for POST /api/v1/auth/leader/teams/member/add
///
/// Body: `{"teamid": N, "username": "..."}`. Returns 201 Created.
#[instrument(skip_all, name = "bff.handlers.add_member")]
pub async fn add_team_member(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), BffError> {
    let request: MemberRequest = parse_body(&body)?;
    let (team_id, username) = request.validate().map_err(bad_request)?;

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .add_member(&ctx, team_id, &username)
        .await
        .map_err(|e| team_api_error(&e))?;

    tracing::info!(target: "bff.handlers.team_admin", team_id, "Team member added");
    Ok((StatusCode::CREATED, Json(ACK_OK)))
}

/// Handler for POST /api/v1/auth/leader/teams/member/remove
///
/// Body: `{"teamid": N, "username": "..."}`
#[instrument(skip_all, name = "bff.handlers.remove_member")]
pub async fn remove_team_member(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    body: Bytes,
) -> Result<Json<Ack>, BffError> {
    let request: MemberRequest = parse_body(&body)?;
    let (team_id, username) = request.validate().map_err(bad_request)?;

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .remove_member(&ctx, team_id, &username)
        .await
        .map_err(|e| team_api_error(&e))?;

    tracing::info!(target: "bff.handlers.team_admin", team_id, "Team member removed");
    Ok(Json(ACK_OK))
}

/// Handler for POST /api/v1/auth/admin/teams/create
///
/// # Response
///
/// - 201 Created
/// - 400 Bad Request: blank name or leader
/// - 502/504: team service failure
#[instrument(skip_all, name = "bff.handlers.create_team")]
pub async fn create_team(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), BffError> {
    let request: CreateTeamRequest = parse_body(&body)?;
    let team = request.validate().map_err(bad_request)?;

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .create_team(&ctx, &team)
        .await
        .map_err(|e| team_api_error(&e))?;

    tracing::info!(target: "bff.handlers.team_admin", leader = %team.leader, "Team created");
    Ok((StatusCode::CREATED, Json(ACK_OK)))
}

/// Handler for POST /api/v1/auth/admin/teams/:teamid/delete
#[instrument(skip_all, name = "bff.handlers.delete_team")]
pub async fn delete_team(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
    Path(raw_id): Path<String>,
) -> Result<Json<Ack>, BffError> {
    let team_id = parse_team_id(&raw_id)?;

    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);
    state
        .downstream
        .delete_team(&ctx, team_id)
        .await
        .map_err(|e| team_api_error(&e))?;

    tracing::info!(target: "bff.handlers.team_admin", team_id, "Team deleted");
    Ok(Json(ACK_OK))
}
