//! Middleware for the BFF.
//!
//! # Components
//!
//! - `auth` - token extraction and verification for protected routes
//! - `gate` - per-route role and verified-identity checks
//! - `http_metrics` - HTTP request metrics for every response

pub mod auth;
pub mod gate;
pub mod http_metrics;

pub use auth::{require_auth, AuthState, BearerToken};
pub use gate::require_gate;
pub use http_metrics::http_metrics_middleware;
