//! HTTP request handlers for the BFF.
//!
//! Every protected handler builds one [`CallContext`] per inbound request.
//! The context carries the caller's bearer token, the inbound deadline and a
//! cancellation token that fires when the handler returns or is dropped.

pub mod admin;
pub mod dashboard;
pub mod health;
pub mod me;
pub mod metrics;
pub mod tasks;
pub mod team_admin;
pub mod teams;

pub use admin::get_admin_teams;
pub use dashboard::get_dashboard;
pub use health::{health_check, readiness_check};
pub use me::get_me;
pub use metrics::metrics_handler;
pub use tasks::{add_comment, create_task, get_my_tasks, get_task_detail, update_task_status};
pub use team_admin::{add_team_member, create_team, delete_team, edit_team, remove_team_member};
pub use teams::get_my_teams;

use crate::errors::BffError;
use crate::middleware::BearerToken;
use crate::models::{Task, Team};
use crate::routes::AppState;
use crate::services::{aggregator, AggregationJob, CallContext, Dependency, TeamTarget};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Build the call context for one inbound request.
///
/// Hold the returned guard for the lifetime of the handler; dropping it
/// cancels every downstream call still in flight for this request.
pub(crate) fn call_context(state: &AppState, bearer: &BearerToken) -> (CallContext, DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = CallContext::new(
        Arc::clone(&bearer.0),
        Instant::now() + state.config.request_timeout(),
        cancel,
    );
    (ctx, guard)
}

/// The caller's teams from the team service.
pub(crate) async fn my_teams(state: &AppState, ctx: &CallContext) -> Result<Vec<Team>, BffError> {
    state
        .downstream
        .my_teams(ctx)
        .await
        .map(|list| list.items)
        .map_err(|e| {
            tracing::warn!(target: "bff.handlers", error = %e, "Failed to retrieve teams");
            BffError::downstream(&Dependency::TeamApi.to_string(), &e)
        })
}

/// Fetch every team's tasks with bounded concurrency.
///
/// Fails as a unit: the first failed team fails the whole fan-out.
pub(crate) async fn tasks_by_team(
    state: &AppState,
    ctx: &CallContext,
    teams: &[Team],
) -> Result<HashMap<i64, Vec<Task>>, BffError> {
    let targets = teams.iter().map(|team| TeamTarget(team.teamid)).collect();
    let job = AggregationJob::new(targets, state.config.fanout_concurrency);

    let results = aggregator::run(job, ctx.cancel_token(), |team: TeamTarget| {
        let client = state.downstream.clone();
        let ctx = ctx.clone();
        async move { client.team_tasks(&ctx, team.0).await.map(|list| list.items) }
    })
    .await
    .map_err(|e| BffError::aggregation(&Dependency::TaskApi.to_string(), &e))?;

    Ok(results
        .into_iter()
        .map(|(team, tasks)| (team.0, tasks))
        .collect())
}

fn positive_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Parse a `:id` path segment. Only positive integers are accepted.
pub(crate) fn parse_task_id(raw: &str) -> Result<i64, BffError> {
    positive_id(raw).ok_or_else(|| BffError::BadRequest("invalid task id".to_string()))
}

/// Parse a `:teamid` path segment.
pub(crate) fn parse_team_id(raw: &str) -> Result<i64, BffError> {
    positive_id(raw).ok_or_else(|| BffError::BadRequest("invalid teamid".to_string()))
}

/// Deserialize a JSON body, answering 400 rather than axum's default 422.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, BffError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "bff.handlers", error = %e, "Invalid request body");
        BffError::BadRequest("Invalid request body".to_string())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::StatusUpdateRequest;

    #[test]
    fn test_parse_task_id() {
        assert_eq!(parse_task_id("42").unwrap(), 42);

        for raw in ["0", "-3", "abc", "", "1.5", "99999999999999999999"] {
            assert!(
                matches!(parse_task_id(raw), Err(BffError::BadRequest(_))),
                "{raw:?} should be rejected"
            );
        }

        assert_eq!(parse_team_id("7").unwrap(), 7);
        assert!(matches!(parse_team_id("0"), Err(BffError::BadRequest(_))));
    }

    #[test]
    fn test_parse_body_rejects_malformed_json_with_400() {
        let err = parse_body::<StatusUpdateRequest>(b"{not json").unwrap_err();
        assert_eq!(err.status_code(), 400);

        let ok: StatusUpdateRequest = parse_body(br#"{"status":"DONE"}"#).unwrap();
        assert_eq!(ok.status, "DONE");
    }
}
