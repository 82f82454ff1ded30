//! BFF error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are generic; the detailed cause is logged
//! server-side. Downstream failures name the logical dependency that failed
//! but never echo the downstream response body.

use crate::auth::gate::GateDenied;
use crate::auth::AuthError;
use crate::services::aggregator::AggregationError;
use crate::services::downstream::DownstreamError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic 401 message. Never varies with the underlying cause.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Non-standard status used when the caller went away before a response was ready.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// BFF error type.
///
/// Maps to HTTP status codes:
/// - InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - BadRequest: 400 Bad Request
/// - BadGateway: 502 Bad Gateway
/// - GatewayTimeout: 504 Gateway Timeout
/// - Cancelled: 499 (empty body)
/// - ServiceUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum BffError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl BffError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            BffError::InvalidToken(_) => 401,
            BffError::Forbidden(_) => 403,
            BffError::BadRequest(_) => 400,
            BffError::BadGateway(_) => 502,
            BffError::GatewayTimeout(_) => 504,
            BffError::Cancelled => CLIENT_CLOSED_REQUEST,
            BffError::ServiceUnavailable(_) => 503,
            BffError::Internal => 500,
        }
    }

    /// Map a single downstream failure, attributed to `dependency`
    /// (e.g. "TeamAPI" or "TaskAPI: team 2").
    pub fn downstream(dependency: &str, err: &DownstreamError) -> Self {
        match err {
            DownstreamError::Timeout => BffError::GatewayTimeout(format!("{dependency}: timeout")),
            DownstreamError::Cancelled => BffError::Cancelled,
            _ => BffError::BadGateway(dependency.to_string()),
        }
    }

    /// Map a failed fan-out whose targets all belong to `dependency`.
    pub fn aggregation(dependency: &str, err: &AggregationError) -> Self {
        match err {
            AggregationError::Downstream { target, source } => {
                Self::downstream(&format!("{dependency}: {target}"), source)
            }
            AggregationError::Cancelled => BffError::Cancelled,
            AggregationError::WorkerFailed(_) => BffError::Internal,
        }
    }
}

impl From<AuthError> for BffError {
    fn from(err: AuthError) -> Self {
        tracing::debug!(target: "bff.auth", kind = err.kind(), "Authentication failed");
        BffError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
    }
}

impl From<GateDenied> for BffError {
    fn from(denied: GateDenied) -> Self {
        match denied {
            GateDenied::Unauthenticated => {
                BffError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
            }
            GateDenied::InsufficientRole => BffError::Forbidden("insufficient role".to_string()),
            GateDenied::IdentityNotVerified => {
                BffError::Forbidden("email not verified".to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for BffError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            BffError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            BffError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            BffError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone()),
            BffError::BadGateway(dependency) => {
                tracing::warn!(target: "bff.availability", dependency = %dependency, "Downstream dependency failed");
                (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", dependency.clone())
            }
            BffError::GatewayTimeout(dependency) => {
                tracing::warn!(target: "bff.availability", dependency = %dependency, "Downstream dependency timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "GATEWAY_TIMEOUT",
                    dependency.clone(),
                )
            }
            BffError::Cancelled => {
                tracing::debug!(target: "bff.availability", "Request cancelled before completion");
                let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
                return status.into_response();
            }
            BffError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "bff.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            BffError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"bff-api\", error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
