//! HTTP routes for the BFF.
//!
//! Defines the Axum router and application state.

use crate::auth::gate::AccessGate;
use crate::auth::jwks::KeySetCache;
use crate::auth::jwt::TokenVerifier;
use crate::auth::principal::{ROLE_ADMIN, ROLE_LEADER, ROLE_STUDENT};
use crate::auth::roles::RoleResolver;
use crate::config::Config;
use crate::errors::BffError;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, require_gate, AuthState};
use crate::services::DownstreamClient;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Slack between the downstream deadline and the outer request timeout, so a
/// late downstream call surfaces as 504 from the handler rather than a bare
/// timeout from the layer.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Application state shared across all handlers.
///
/// Built once at startup and passed explicitly; nothing is looked up
/// globally.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Verification keys, shared with the background refresher.
    pub key_set: Arc<KeySetCache>,

    pub verifier: Arc<TokenVerifier>,

    /// Team and task service client.
    pub downstream: DownstreamClient,
}

impl AppState {
    /// Wire the verifier and downstream client around an initialized key set.
    ///
    /// # Errors
    ///
    /// Returns `BffError::Internal` if the downstream HTTP client cannot be built.
    pub fn new(config: Config, key_set: Arc<KeySetCache>) -> Result<Self, BffError> {
        let verifier = Arc::new(TokenVerifier::new(
            Arc::clone(&key_set),
            RoleResolver::new(config.token_client_id.clone()),
            config.verifier_config(),
        ));
        let downstream =
            DownstreamClient::new(config.team_service_url.clone(), config.task_service_url.clone())?;

        Ok(Self {
            config,
            key_set,
            verifier,
            downstream,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready`, `/metrics` - public, unversioned
/// - `/api/v1/auth/...` - any of student, leader, admin with a verified email
/// - `/api/v1/auth/leader/...` - additionally leader or admin
/// - `/api/v1/auth/admin/...` - additionally admin
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - Request timeout slightly above the downstream deadline
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        verifier: Arc::clone(&state.verifier),
        cookie_name: state.config.access_token_cookie.clone(),
    });

    let user_gate =
        Arc::new(AccessGate::any_of(&[ROLE_STUDENT, ROLE_LEADER, ROLE_ADMIN]).verified());
    let leader_gate = Arc::new(AccessGate::any_of(&[ROLE_LEADER, ROLE_ADMIN]));
    let admin_gate = Arc::new(AccessGate::any_of(&[ROLE_ADMIN]));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let leader_routes = Router::new()
        .route("/api/v1/auth/leader/tasks", post(handlers::create_task))
        .route("/api/v1/auth/leader/teams/edit", post(handlers::edit_team))
        .route(
            "/api/v1/auth/leader/teams/member/add",
            post(handlers::add_team_member),
        )
        .route(
            "/api/v1/auth/leader/teams/member/remove",
            post(handlers::remove_team_member),
        )
        .route_layer(middleware::from_fn_with_state(leader_gate, require_gate));

    let admin_routes = Router::new()
        .route("/api/v1/auth/admin/teams", get(handlers::get_admin_teams))
        .route("/api/v1/auth/admin/teams/create", post(handlers::create_team))
        .route(
            "/api/v1/auth/admin/teams/:teamid/delete",
            post(handlers::delete_team),
        )
        .route_layer(middleware::from_fn_with_state(admin_gate, require_gate));

    // Protected routes. Layers run outermost first:
    // require_auth -> user gate -> leader/admin gate -> handler
    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::get_me))
        .route("/api/v1/auth/dashboard", get(handlers::get_dashboard))
        .route("/api/v1/auth/myteams", get(handlers::get_my_teams))
        .route("/api/v1/auth/mytasks", get(handlers::get_my_tasks))
        .route("/api/v1/auth/tasks/:id", get(handlers::get_task_detail))
        .route(
            "/api/v1/auth/tasks/:id/status",
            post(handlers::update_task_status),
        )
        .route("/api/v1/auth/tasks/:id/comment", post(handlers::add_comment))
        .merge(leader_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(user_gate, require_gate))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state.clone());

    // Layer order (the last layer added runs first):
    // 1. TraceLayer (innermost)
    // 2. TimeoutLayer
    // 3. http_metrics_middleware - records ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(
            state.config.request_timeout() + TIMEOUT_GRACE,
        ))
        .layer(middleware::from_fn(http_metrics_middleware))
}
