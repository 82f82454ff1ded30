//! HTTP client for the team and task services.
//!
//! Every call forwards the caller's bearer token unchanged, asks for JSON,
//! and is bounded by whatever remains of the inbound request's deadline.
//! Non-2xx responses become [`DownstreamError::Status`]; the response body
//! is kept for server-side diagnostics and never returned to clients.

use crate::errors::BffError;
use crate::models::{
    ChangeStatusBody, Comment, CommentList, EditTeamBody, MemberBody, NewCommentBody,
    NewTaskBody, NewTeamBody, Task, TaskList, TeamList,
};
use crate::observability::metrics;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// TCP connect timeout; the overall bound comes from the request deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Max downstream body bytes kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Errors from one downstream call.
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("timeout")]
    Timeout,

    #[error("downstream {method} {url} -> {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("cancelled")]
    Cancelled,
}

impl DownstreamError {
    fn metric_status(&self) -> &'static str {
        match self {
            DownstreamError::Timeout => "timeout",
            DownstreamError::Cancelled => "cancelled",
            _ => "error",
        }
    }
}

/// Logical downstream dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    TeamApi,
    TaskApi,
}

impl Dependency {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Dependency::TeamApi => "team_api",
            Dependency::TaskApi => "task_api",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::TeamApi => f.write_str("TeamAPI"),
            Dependency::TaskApi => f.write_str("TaskAPI"),
        }
    }
}

/// Per-request call context: the caller's credential, the inbound deadline
/// and the request's cancellation signal.
#[derive(Clone)]
pub struct CallContext {
    bearer: Arc<SecretString>,
    deadline: Instant,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(bearer: Arc<SecretString>, deadline: Instant, cancel: CancellationToken) -> Self {
        Self {
            bearer,
            deadline,
            cancel,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the inbound deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("bearer", &"[REDACTED]")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Typed JSON client for the team and task services.
#[derive(Clone)]
pub struct DownstreamClient {
    client: Client,
    team_base: String,
    task_base: String,
}

impl DownstreamClient {
    /// Create a client for the given service base URLs.
    ///
    /// # Errors
    ///
    /// Returns `BffError::Internal` if the HTTP client cannot be built.
    pub fn new(team_base: impl Into<String>, task_base: impl Into<String>) -> Result<Self, BffError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                tracing::error!(target: "bff.services.downstream", error = %e, "Failed to build HTTP client");
                BffError::Internal
            })?;

        Ok(Self {
            client,
            team_base: trim_base(team_base.into()),
            task_base: trim_base(task_base.into()),
        })
    }

    /// `GET TeamBase/auth/my-teams`
    #[instrument(skip_all, name = "bff.downstream.my_teams")]
    pub async fn my_teams(&self, ctx: &CallContext) -> Result<TeamList, DownstreamError> {
        let url = format!("{}/auth/my-teams", self.team_base);
        self.get_json(ctx, Dependency::TeamApi, url).await
    }

    /// `GET TeamBase/admin/teams`
    #[instrument(skip_all, name = "bff.downstream.admin_teams")]
    pub async fn admin_teams(&self, ctx: &CallContext) -> Result<TeamList, DownstreamError> {
        let url = format!("{}/admin/teams", self.team_base);
        self.get_json(ctx, Dependency::TeamApi, url).await
    }

    /// `GET TaskBase/auth/tasks?teamid=N`
    #[instrument(skip_all, name = "bff.downstream.team_tasks", fields(team_id = team_id))]
    pub async fn team_tasks(
        &self,
        ctx: &CallContext,
        team_id: i64,
    ) -> Result<TaskList, DownstreamError> {
        let url = format!("{}/auth/tasks?teamid={team_id}", self.task_base);
        self.get_json(ctx, Dependency::TaskApi, url).await
    }

    /// `GET TaskBase/auth/tasks/{id}`
    #[instrument(skip_all, name = "bff.downstream.task_by_id", fields(task_id = task_id))]
    pub async fn task_by_id(&self, ctx: &CallContext, task_id: i64) -> Result<Task, DownstreamError> {
        let url = format!("{}/auth/tasks/{task_id}", self.task_base);
        self.get_json(ctx, Dependency::TaskApi, url).await
    }

    /// `GET TaskBase/auth/comments?taskid=N&limit=200`
    #[instrument(skip_all, name = "bff.downstream.comments", fields(task_id = task_id))]
    pub async fn comments_by_task(
        &self,
        ctx: &CallContext,
        task_id: i64,
    ) -> Result<Vec<Comment>, DownstreamError> {
        let url = format!("{}/auth/comments?taskid={task_id}&limit=200", self.task_base);
        let list: CommentList = self.get_json(ctx, Dependency::TaskApi, url).await?;
        Ok(list.items)
    }

    /// `PATCH TaskBase/auth/change-status?taskid=&status=` with `{taskid, status}`.
    ///
    /// `status` must already be one of the known task statuses.
    #[instrument(skip_all, name = "bff.downstream.change_status", fields(task_id = task_id))]
    pub async fn change_status(
        &self,
        ctx: &CallContext,
        task_id: i64,
        status: &str,
    ) -> Result<(), DownstreamError> {
        let url = format!(
            "{}/auth/change-status?taskid={task_id}&status={status}",
            self.task_base
        );
        let body = ChangeStatusBody {
            taskid: task_id,
            status: status.to_string(),
        };
        let request = self.client.request(Method::PATCH, &url).json(&body);
        self.send(ctx, Dependency::TaskApi, Method::PATCH, url, request)
            .await
            .map(drop)
    }

    /// `POST TaskBase/auth/comments` with `{taskid, body}`.
    #[instrument(skip_all, name = "bff.downstream.add_comment", fields(task_id = task_id))]
    pub async fn add_comment(
        &self,
        ctx: &CallContext,
        task_id: i64,
        body: &str,
    ) -> Result<(), DownstreamError> {
        let url = format!("{}/auth/comments", self.task_base);
        let payload = NewCommentBody {
            taskid: task_id,
            body: body.to_string(),
        };
        let request = self.client.post(&url).json(&payload);
        self.send(ctx, Dependency::TaskApi, Method::POST, url, request)
            .await
            .map(drop)
    }

    /// `POST TaskBase/auth/tasks`
    #[instrument(skip_all, name = "bff.downstream.create_task", fields(team_id = task.teamid))]
    pub async fn create_task(
        &self,
        ctx: &CallContext,
        task: &NewTaskBody,
    ) -> Result<(), DownstreamError> {
        let url = format!("{}/auth/tasks", self.task_base);
        let request = self.client.post(&url).json(task);
        self.send(ctx, Dependency::TaskApi, Method::POST, url, request)
            .await
            .map(drop)
    }

    /// `POST TeamBase/admin/teams` with `{name, description, leader}`.
    #[instrument(skip_all, name = "bff.downstream.create_team")]
    pub async fn create_team(
        &self,
        ctx: &CallContext,
        team: &NewTeamBody,
    ) -> Result<(), DownstreamError> {
        let url = format!("{}/admin/teams", self.team_base);
        let request = self.client.post(&url).json(team);
        self.send(ctx, Dependency::TeamApi, Method::POST, url, request)
            .await
            .map(drop)
    }

    /// `PUT TeamBase/admin/teams?teamid=N` with `{teamid, name, description}`.
    #[instrument(skip_all, name = "bff.downstream.edit_team", fields(team_id = team.teamid))]
    pub async fn edit_team(
        &self,
        ctx: &CallContext,
        team: &EditTeamBody,
    ) -> Result<(), DownstreamError> {
        let url = format!("{}/admin/teams?teamid={}", self.team_base, team.teamid);
        let request = self.client.put(&url).json(team);
        self.send(ctx, Dependency::TeamApi, Method::PUT, url, request)
            .await
            .map(drop)
    }

    /// `DELETE TeamBase/admin/teams?teamid=N`
    #[instrument(skip_all, name = "bff.downstream.delete_team", fields(team_id = team_id))]
    pub async fn delete_team(&self, ctx: &CallContext, team_id: i64) -> Result<(), DownstreamError> {
        let url = format!("{}/admin/teams?teamid={team_id}", self.team_base);
        let request = self.client.delete(&url);
        self.send(ctx, Dependency::TeamApi, Method::DELETE, url, request)
            .await
            .map(drop)
    }

    /// `POST TeamBase/leader/teams/{id}/members` with `{username}`.
    #[instrument(skip_all, name = "bff.downstream.add_member", fields(team_id = team_id))]
    pub async fn add_member(
        &self,
        ctx: &CallContext,
        team_id: i64,
        username: &str,
    ) -> Result<(), DownstreamError> {
        let url = format!("{}/leader/teams/{team_id}/members", self.team_base);
        let body = MemberBody {
            username: username.to_string(),
        };
        let request = self.client.post(&url).json(&body);
        self.send(ctx, Dependency::TeamApi, Method::POST, url, request)
            .await
            .map(drop)
    }

    /// `DELETE TeamBase/leader/teams/{id}/members/{username}`
    ///
    /// The username is percent-encoded as a single path segment.
    #[instrument(skip_all, name = "bff.downstream.remove_member", fields(team_id = team_id))]
    pub async fn remove_member(
        &self,
        ctx: &CallContext,
        team_id: i64,
        username: &str,
    ) -> Result<(), DownstreamError> {
        let url = member_url(&self.team_base, team_id, username)?;
        let request = self.client.delete(url.clone());
        self.send(ctx, Dependency::TeamApi, Method::DELETE, url.to_string(), request)
            .await
            .map(drop)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        dependency: Dependency,
        url: String,
    ) -> Result<T, DownstreamError> {
        let request = self.client.get(&url);
        let response = self.send(ctx, dependency, Method::GET, url, request).await?;

        let decode = response.json::<T>();
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(DownstreamError::Cancelled),
            () = tokio::time::sleep_until(ctx.deadline) => Err(DownstreamError::Timeout),
            result = decode => result.map_err(|e| {
                warn!(target: "bff.services.downstream", dependency = %dependency, error = %e, "Failed to decode downstream response");
                DownstreamError::Decode(e.to_string())
            }),
        }
    }

    /// Send with the shared headers and deadline, then check the status.
    async fn send(
        &self,
        ctx: &CallContext,
        dependency: Dependency,
        method: Method,
        url: String,
        request: RequestBuilder,
    ) -> Result<Response, DownstreamError> {
        let start = std::time::Instant::now();
        let result = self.send_inner(ctx, method, url, request).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.metric_status(),
        };
        metrics::record_downstream_request(dependency.label(), status, start.elapsed());

        if let Err(e) = &result {
            match e {
                DownstreamError::Status {
                    method,
                    url,
                    status,
                    body,
                } => {
                    warn!(
                        target: "bff.services.downstream",
                        dependency = %dependency,
                        method = %method,
                        url = %url,
                        status = status,
                        body = %body,
                        "Downstream returned error status"
                    );
                }
                other => {
                    warn!(target: "bff.services.downstream", dependency = %dependency, error = %other, "Downstream call failed");
                }
            }
        }

        result
    }

    async fn send_inner(
        &self,
        ctx: &CallContext,
        method: Method,
        url: String,
        request: RequestBuilder,
    ) -> Result<Response, DownstreamError> {
        if ctx.cancel.is_cancelled() {
            return Err(DownstreamError::Cancelled);
        }

        let remaining = ctx.remaining();
        if remaining.is_zero() {
            return Err(DownstreamError::Timeout);
        }

        let request = request
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(ctx.bearer.expose_secret())
            .timeout(remaining);

        let response = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(DownstreamError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_timeout() {
                    DownstreamError::Timeout
                } else {
                    DownstreamError::Transport(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownstreamError::Status {
                method,
                url,
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(response)
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

fn member_url(team_base: &str, team_id: i64, username: &str) -> Result<Url, DownstreamError> {
    let mut url = Url::parse(&format!("{team_base}/leader/teams/{team_id}/members"))
        .map_err(|e| DownstreamError::Transport(format!("invalid team service URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| DownstreamError::Transport("team service URL cannot be a base".to_string()))?
        .push(username);
    Ok(url)
}
