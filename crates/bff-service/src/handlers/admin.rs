//! Admin handlers.
//!
//! Routed behind the admin gate; handlers assume the role check has passed.

use crate::errors::BffError;
use crate::handlers::{call_context, tasks_by_team};
use crate::middleware::BearerToken;
use crate::models::{AdminTeamRow, AdminTeamsView};
use crate::routes::AppState;
use crate::services::Dependency;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/auth/admin/teams
///
/// Every team in the system with task totals, per-status counts and up to
/// five preview titles.
#[instrument(skip_all, name = "bff.handlers.admin_teams")]
pub async fn get_admin_teams(
    State(state): State<Arc<AppState>>,
    Extension(bearer): Extension<BearerToken>,
) -> Result<Json<AdminTeamsView>, BffError> {
    let (ctx, _cancel_on_drop) = call_context(&state, &bearer);

    let teams = state
        .downstream
        .admin_teams(&ctx)
        .await
        .map(|list| list.items)
        .map_err(|e| {
            tracing::warn!(target: "bff.handlers.admin", error = %e, "Failed to retrieve all teams");
            BffError::downstream(&Dependency::TeamApi.to_string(), &e)
        })?;

    let by_team = tasks_by_team(&state, &ctx, &teams).await?;

    let rows = teams
        .into_iter()
        .map(|team| {
            let tasks = by_team.get(&team.teamid).map(Vec::as_slice).unwrap_or_default();
            AdminTeamRow::summarize(team, tasks)
        })
        .collect();

    Ok(Json(AdminTeamsView { rows }))
}
