//! Team/Task BFF Service Library
//!
//! A backend-for-frontend that authenticates end users with bearer tokens
//! issued by an external identity provider, enforces role-based access, and
//! fans requests out to the team and task services, merging their results
//! into one response.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware (auth, gate) -> handlers/*.rs -> services/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - key-set cache, token verification, role resolution, access gates
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication, gating and HTTP metrics middleware
//! - `models` - Downstream payloads and response views
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup and application state
//! - `services` - Downstream client and fan-out aggregator
//! - `tasks` - Background tasks

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod tasks;
