//! BFF configuration.
//!
//! Configuration is loaded from environment variables. Nothing here is a
//! secret: the BFF only verifies tokens and never holds signing keys or
//! service credentials.

use crate::auth::jwks::{
    KeySetConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_REFRESH_INTERVAL, DEFAULT_REFRESH_RATE_LIMIT,
};
use crate::auth::jwt::VerifierConfig;
use crate::services::aggregator::DEFAULT_CONCURRENCY;
use common::jwt::{
    parse_allowed_algorithms, DEFAULT_ALLOWED_ALGORITHMS, DEFAULT_LEEWAY, MAX_LEEWAY,
};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_TEAM_SERVICE_URL: &str = "http://localhost:8081";
pub const DEFAULT_TASK_SERVICE_URL: &str = "http://localhost:8082";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_ACCESS_TOKEN_COOKIE: &str = "access_token";

// Upper bounds keep every derived deadline representable as an `Instant`.
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 3600;
pub const MAX_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 86_400;
pub const MAX_JWKS_REFRESH_RATE_LIMIT_SECONDS: u64 = 86_400;
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 300;
pub const MAX_FANOUT_CONCURRENCY: u64 = 1024;

/// BFF configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Key-distribution endpoint of the identity provider.
    pub jwks_url: String,

    /// Expected `iss`, matched exactly.
    pub token_issuer: String,

    /// Expected entry in `aud`.
    pub token_audience: String,

    /// Client whose `resource_access` roles are merged with realm roles.
    /// Empty means realm roles only.
    pub token_client_id: String,

    /// Leeway for `exp`/`nbf` checks in seconds.
    pub jwt_leeway_seconds: u64,

    /// Signing algorithms accepted in token headers.
    pub allowed_algorithms: Vec<Algorithm>,

    pub jwks_refresh_interval_seconds: u64,

    /// Minimum spacing between miss-triggered key refreshes.
    pub jwks_refresh_rate_limit_seconds: u64,

    pub jwks_fetch_timeout_seconds: u64,

    pub team_service_url: String,

    pub task_service_url: String,

    /// Max downstream calls in flight per fan-out.
    pub fanout_concurrency: usize,

    /// Inbound request deadline, propagated to every downstream call.
    pub request_timeout_seconds: u64,

    /// Cookie consulted when no `Authorization: Bearer` header is present.
    pub access_token_cookie: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT leeway configuration: {0}")]
    InvalidJwtLeeway(String),

    #[error("Invalid signing algorithm configuration: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = required(vars, "JWKS_URL")?;
        let token_issuer = required(vars, "TOKEN_ISSUER")?;
        let token_audience = required(vars, "TOKEN_AUDIENCE")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let token_client_id = vars.get("TOKEN_CLIENT_ID").cloned().unwrap_or_default();

        let jwt_leeway_seconds = if let Some(value_str) = vars.get("JWT_LEEWAY_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be positive, got {}",
                    value
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_LEEWAY.as_secs() {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must not exceed {} seconds, got {}",
                    MAX_LEEWAY.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_LEEWAY.as_secs()
        };

        let algorithms_str = vars
            .get("JWT_ALLOWED_ALGORITHMS")
            .map(String::as_str)
            .unwrap_or(DEFAULT_ALLOWED_ALGORITHMS);
        let allowed_algorithms = parse_allowed_algorithms(algorithms_str)
            .map_err(|e| ConfigError::InvalidAlgorithms(e.to_string()))?;

        let jwks_refresh_interval_seconds = positive_u64(
            vars,
            "JWKS_REFRESH_INTERVAL_SECONDS",
            DEFAULT_REFRESH_INTERVAL.as_secs(),
            MAX_JWKS_REFRESH_INTERVAL_SECONDS,
        )?;

        // Zero is allowed: every miss may refresh.
        let jwks_refresh_rate_limit_seconds = match vars.get("JWKS_REFRESH_RATE_LIMIT_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
                    name: "JWKS_REFRESH_RATE_LIMIT_SECONDS".to_string(),
                    reason: format!("must be a non-negative integer, got '{}': {}", value_str, e),
                })?;
                at_most(
                    "JWKS_REFRESH_RATE_LIMIT_SECONDS",
                    value,
                    MAX_JWKS_REFRESH_RATE_LIMIT_SECONDS,
                )?
            }
            None => DEFAULT_REFRESH_RATE_LIMIT.as_secs(),
        };

        let jwks_fetch_timeout_seconds = positive_u64(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT.as_secs(),
            MAX_JWKS_FETCH_TIMEOUT_SECONDS,
        )?;

        let team_service_url = vars
            .get("TEAM_SERVICE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TEAM_SERVICE_URL.to_string());

        let task_service_url = vars
            .get("TASK_SERVICE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TASK_SERVICE_URL.to_string());

        let fanout_concurrency = positive_u64(
            vars,
            "FANOUT_CONCURRENCY",
            DEFAULT_CONCURRENCY as u64,
            MAX_FANOUT_CONCURRENCY,
        )?;
        let fanout_concurrency =
            usize::try_from(fanout_concurrency).map_err(|e| ConfigError::InvalidValue {
                name: "FANOUT_CONCURRENCY".to_string(),
                reason: e.to_string(),
            })?;

        let request_timeout_seconds = positive_u64(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
            MAX_REQUEST_TIMEOUT_SECONDS,
        )?;

        let access_token_cookie = vars
            .get("ACCESS_TOKEN_COOKIE")
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ACCESS_TOKEN_COOKIE.to_string());

        Ok(Config {
            bind_address,
            jwks_url,
            token_issuer,
            token_audience,
            token_client_id,
            jwt_leeway_seconds,
            allowed_algorithms,
            jwks_refresh_interval_seconds,
            jwks_refresh_rate_limit_seconds,
            jwks_fetch_timeout_seconds,
            team_service_url,
            task_service_url,
            fanout_concurrency,
            request_timeout_seconds,
            access_token_cookie,
        })
    }

    pub fn key_set_config(&self) -> KeySetConfig {
        KeySetConfig {
            jwks_url: self.jwks_url.clone(),
            refresh_interval: Duration::from_secs(self.jwks_refresh_interval_seconds),
            refresh_rate_limit: Duration::from_secs(self.jwks_refresh_rate_limit_seconds),
            fetch_timeout: Duration::from_secs(self.jwks_fetch_timeout_seconds),
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            issuer: self.token_issuer.clone(),
            audience: self.token_audience.clone(),
            leeway: Duration::from_secs(self.jwt_leeway_seconds),
            allowed_algorithms: self.allowed_algorithms.clone(),
        }
    }

    /// Inbound deadline, clamped to [`MAX_REQUEST_TIMEOUT_SECONDS`] for
    /// configs built by hand.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.min(MAX_REQUEST_TIMEOUT_SECONDS))
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn positive_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{}': {}", value_str, e),
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    at_most(name, value, max)
}

fn at_most(name: &str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value > max {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must not exceed {}, got {}", max, value),
        });
    }

    Ok(value)
}
