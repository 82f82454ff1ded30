//! Dashboard handler.
//!
//! `GET /api/v1/auth/dashboard` lists the caller's teams, fans out one task
//! query per team, and summarizes the merged task set.

use crate::auth::principal::Principal;
use crate::errors::BffError;
use crate::handlers::{call_context, my_teams, tasks_by_team};
use crate::middleware::BearerToken;
use crate::models::{DashboardView, StatusCounts, Task, Team, UserView, DASHBOARD_LIST_LIMIT};
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/auth/dashboard
///
/// # Response
///
/// - 200 OK: totals, per-status counts, up to 10 tasks assigned to and
///   created by the caller, and the caller's teams
/// - 502 Bad Gateway: the team list or any team's task list failed
/// - 504 Gateway Timeout: a downstream call ran past the request deadline
#[instrument(skip_all, name = "bff.handlers.dashboard")]
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Extension(bearer): Extension<BearerToken>,
) -> Result<Json<DashboardView>, BffError> {
    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);

    let teams = my_teams(&state, &ctx).await?;
    let mut by_team = tasks_by_team(&state, &ctx, &teams).await?;

    let all_tasks: Vec<Task> = teams
        .iter()
        .filter_map(|team| by_team.remove(&team.teamid))
        .flatten()
        .collect();

    tracing::debug!(
        target: "bff.handlers.dashboard",
        teams = teams.len(),
        tasks = all_tasks.len(),
        "Dashboard aggregated"
    );

    Ok(Json(summarize(&principal, teams, all_tasks)))
}

fn summarize(principal: &Principal, teams: Vec<Team>, tasks: Vec<Task>) -> DashboardView {
    let username = principal.username.as_str();

    let assigned_to_me = tasks
        .iter()
        .filter(|t| t.assignee == username)
        .take(DASHBOARD_LIST_LIMIT)
        .cloned()
        .collect();
    let created_by_me = tasks
        .iter()
        .filter(|t| t.author == username)
        .take(DASHBOARD_LIST_LIMIT)
        .cloned()
        .collect();

    DashboardView {
        user: UserView::from(principal),
        total_teams: teams.len(),
        total_tasks: tasks.len(),
        status_counts: StatusCounts::tally(&tasks),
        assigned_to_me,
        created_by_me,
        teams,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{STATUS_DONE, STATUS_TODO};
    use std::collections::HashSet;

    fn principal(username: &str) -> Principal {
        Principal {
            sub: "sub".to_string(),
            username: username.to_string(),
            email: String::new(),
            email_verified: true,
            given_name: String::new(),
            family_name: String::new(),
            roles: HashSet::from(["student".to_string()]),
        }
    }

    fn task(id: i64, author: &str, assignee: &str, status: &str) -> Task {
        Task {
            taskid: id,
            author: author.to_string(),
            assignee: assignee.to_string(),
            status: status.to_string(),
            ..Task::default()
        }
    }

    #[test]
    fn test_summary_splits_assigned_and_created() {
        let tasks = vec![
            task(1, "bob", "alice", STATUS_TODO),
            task(2, "alice", "bob", STATUS_DONE),
            task(3, "alice", "alice", STATUS_TODO),
            task(4, "bob", "carol", STATUS_TODO),
        ];
        let teams = vec![Team { teamid: 1, ..Team::default() }];

        let view = summarize(&principal("alice"), teams, tasks);

        assert_eq!(view.total_teams, 1);
        assert_eq!(view.total_tasks, 4);
        assert_eq!(view.status_counts.get(STATUS_TODO), 3);
        assert_eq!(
            view.assigned_to_me.iter().map(|t| t.taskid).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(
            view.created_by_me.iter().map(|t| t.taskid).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_summary_lists_are_capped() {
        let tasks: Vec<Task> = (1..=25).map(|i| task(i, "alice", "alice", STATUS_TODO)).collect();

        let view = summarize(&principal("alice"), Vec::new(), tasks);

        assert_eq!(view.total_tasks, 25);
        assert_eq!(view.assigned_to_me.len(), DASHBOARD_LIST_LIMIT);
        assert_eq!(view.created_by_me.len(), DASHBOARD_LIST_LIMIT);
    }
}
