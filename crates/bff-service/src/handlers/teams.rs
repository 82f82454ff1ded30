//! Team overview handler.

use crate::auth::principal::Principal;
use crate::errors::BffError;
use crate::handlers::{call_context, my_teams, tasks_by_team};
use crate::middleware::BearerToken;
use crate::models::{MyTeamsView, TeamRow, UserView};
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/auth/myteams
///
/// One row per team with per-status counts, the total and a preview of the
/// first five tasks. `can_create` is admin only; `can_manage` is leader or
/// admin.
///
/// # Response
///
/// - 200 OK
/// - 502/504: team list or a team's task list failed
#[instrument(skip_all, name = "bff.handlers.my_teams")]
pub async fn get_my_teams(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Extension(bearer): Extension<BearerToken>,
) -> Result<Json<MyTeamsView>, BffError> {
    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);

    let teams = my_teams(&state, &ctx).await?;
    let by_team = tasks_by_team(&state, &ctx, &teams).await?;

    let rows = teams
        .into_iter()
        .map(|team| {
            let tasks = by_team.get(&team.teamid).map(Vec::as_slice).unwrap_or_default();
            TeamRow::summarize(team, tasks)
        })
        .collect();

    let is_admin = principal.is_admin();
    let is_leader = principal.is_leader();

    Ok(Json(MyTeamsView {
        user: UserView::from(&principal),
        is_admin,
        is_leader,
        can_create: is_admin,
        can_manage: is_admin || is_leader,
        rows,
    }))
}
