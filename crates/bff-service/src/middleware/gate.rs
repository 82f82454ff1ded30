//! Access-gate middleware.
//!
//! Each protected route group is wrapped with its own [`AccessGate`]; the
//! gate reads the `Principal` left by `require_auth` and refuses the request
//! before any handler or downstream work runs.

use crate::auth::gate::AccessGate;
use crate::errors::BffError;
use crate::middleware::auth::PrincipalExt;
use crate::observability::metrics;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// Enforce the route group's gate.
///
/// # Response
///
/// - 401 if no principal is attached
/// - 403 if the role or verified-identity check fails
#[instrument(skip_all, name = "bff.middleware.gate")]
pub async fn require_gate(
    State(gate): State<Arc<AccessGate>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, BffError> {
    if let Err(denied) = gate.check(req.principal()) {
        metrics::record_gate_denial(denied.reason());
        tracing::debug!(
            target: "bff.auth.gate",
            reason = denied.reason(),
            path = %req.uri().path(),
            "Request denied by access gate"
        );
        return Err(denied.into());
    }

    Ok(next.run(req).await)
}
