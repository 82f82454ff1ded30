//! Metrics definitions for the BFF.
//!
//! All metrics follow Prometheus naming conventions:
//! - `bff_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: route templates, unknown paths collapse to `/other`
//! - `status`: success, error, timeout
//! - `outcome` / `reason`: bounded by error variants
//! - `dependency`: `team_api`, `task_api`
//!
//! Task ids and team ids never appear in labels.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle served at `/metrics`.
///
/// Must be called before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("bff_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Downstream calls are bounded by the inbound deadline (30s default)
        .set_buckets_for_metric(
            Matcher::Prefix("bff_downstream_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
                30.000,
            ],
        )
        .map_err(|e| format!("Failed to set downstream request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("bff_fanout_targets".to_string()),
            &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0],
        )
        .map_err(|e| format!("Failed to set fan-out buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `bff_http_requests_total`, `bff_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
///
/// Captures every response, including framework rejections (404, 405, 415)
/// that never reach a handler.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("bff_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("bff_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/api/v1/auth/me" | "/api/v1/auth/dashboard"
        | "/api/v1/auth/myteams" | "/api/v1/auth/mytasks" | "/api/v1/auth/leader/tasks"
        | "/api/v1/auth/admin/teams"
        | "/api/v1/auth/admin/teams/create"
        | "/api/v1/auth/leader/teams/edit"
        | "/api/v1/auth/leader/teams/member/add"
        | "/api/v1/auth/leader/teams/member/remove" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replace task and team ids with placeholders.
fn normalize_dynamic_endpoint(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/v1/auth/admin/teams/") {
        if let Some((id, "delete")) = rest.split_once('/') {
            if !id.is_empty() {
                return "/api/v1/auth/admin/teams/{teamid}/delete".to_string();
            }
        }
    }

    if let Some(rest) = path.strip_prefix("/api/v1/auth/tasks/") {
        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [id] if !id.is_empty() => return "/api/v1/auth/tasks/{id}".to_string(),
            [id, "status"] if !id.is_empty() => {
                return "/api/v1/auth/tasks/{id}/status".to_string()
            }
            [id, "comment"] if !id.is_empty() => {
                return "/api/v1/auth/tasks/{id}/comment".to_string()
            }
            _ => {}
        }
    }

    // Unknown paths normalized to "/other" to bound cardinality
    "/other".to_string()
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a token verification outcome
///
/// Metric: `bff_token_validations_total`
/// Labels: `outcome` (`success` or an `AuthError::kind` label)
pub fn record_token_validation(outcome: &str) {
    counter!("bff_token_validations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a key-set refresh attempt
///
/// Metric: `bff_jwks_refresh_total`
/// Labels: `trigger` (initial, scheduled, miss), `status` (success, error)
pub fn record_jwks_refresh(trigger: &str, status: &str) {
    counter!("bff_jwks_refresh_total",
        "trigger" => trigger.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a request refused by an access gate
///
/// Metric: `bff_gate_denials_total`
/// Labels: `reason`
pub fn record_gate_denial(reason: &str) {
    counter!("bff_gate_denials_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ============================================================================
// Downstream Metrics
// ============================================================================

/// Record one downstream call
///
/// Metric: `bff_downstream_requests_total`, `bff_downstream_request_duration_seconds`
/// Labels: `dependency`, `status`
pub fn record_downstream_request(dependency: &str, status: &str, duration: Duration) {
    histogram!("bff_downstream_request_duration_seconds",
        "dependency" => dependency.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("bff_downstream_requests_total",
        "dependency" => dependency.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the size of one fan-out
///
/// Metric: `bff_fanout_targets`
#[allow(clippy::cast_precision_loss)]
pub fn record_fanout_targets(count: usize) {
    histogram!("bff_fanout_targets").record(count as f64);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // These execute against the global no-op recorder; values are not checked.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/api/v1/auth/dashboard", 200, Duration::from_millis(80));
        record_http_request("GET", "/api/v1/auth/tasks/42", 502, Duration::from_millis(30));
        record_http_request("POST", "/api/v1/auth/tasks/42/status", 401, Duration::from_millis(2));
        record_http_request("GET", "/api/v1/auth/admin/teams", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(403), "error");
        assert_eq!(categorize_status_code(499), "error");
        assert_eq!(categorize_status_code(502), "error");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/api/v1/auth/me"), "/api/v1/auth/me");
        assert_eq!(
            normalize_endpoint("/api/v1/auth/admin/teams"),
            "/api/v1/auth/admin/teams"
        );
    }

    #[test]
    fn test_normalize_endpoint_task_paths() {
        assert_eq!(
            normalize_endpoint("/api/v1/auth/tasks/17"),
            "/api/v1/auth/tasks/{id}"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/auth/tasks/17/status"),
            "/api/v1/auth/tasks/{id}/status"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/auth/tasks/abc/comment"),
            "/api/v1/auth/tasks/{id}/comment"
        );
    }

    #[test]
    fn test_normalize_endpoint_team_paths() {
        assert_eq!(
            normalize_endpoint("/api/v1/auth/admin/teams/9/delete"),
            "/api/v1/auth/admin/teams/{teamid}/delete"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/auth/leader/teams/member/add"),
            "/api/v1/auth/leader/teams/member/add"
        );
        assert_eq!(normalize_endpoint("/api/v1/auth/admin/teams//delete"), "/other");
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/unknown"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/auth/tasks/"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/auth/tasks/1/delete"), "/other");
        assert_eq!(normalize_endpoint("/api/v2/auth/me"), "/other");
    }

    #[test]
    fn test_record_auth_metrics() {
        record_token_validation("success");
        record_token_validation("expired");
        record_jwks_refresh("scheduled", "success");
        record_jwks_refresh("miss", "error");
        record_gate_denial("insufficient_role");
    }

    #[test]
    fn test_record_downstream_metrics() {
        record_downstream_request("task_api", "success", Duration::from_millis(12));
        record_downstream_request("team_api", "timeout", Duration::from_secs(30));
        record_fanout_targets(3);
    }
}
