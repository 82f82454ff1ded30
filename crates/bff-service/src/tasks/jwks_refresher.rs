//! Scheduled key-set refresh.
//!
//! Re-fetches the full key set every `refresh_interval` regardless of cache
//! misses, so rotated keys are picked up before the first token signed with
//! them arrives. A failed refresh keeps the previous keys and is retried on
//! the next tick; it is never fatal.
//!
//! # Graceful Shutdown
//!
//! Exits when the cancellation token fires. An in-flight fetch is bounded by
//! the key set's own fetch timeout.

use crate::auth::jwks::{KeySetCache, RefreshTrigger};
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

/// Run the refresher until `cancel_token` fires.
///
/// The first tick is one full interval after start; startup has already
/// fetched the keys.
pub async fn start_jwks_refresher(key_set: Arc<KeySetCache>, cancel_token: CancellationToken) {
    let period = key_set.config().refresh_interval;

    async move {
        info!(
            target: "bff.task.jwks_refresher",
            interval_seconds = period.as_secs(),
            "JWKS refresher started"
        );

        let Some(first_tick) = Instant::now().checked_add(period).filter(|_| !period.is_zero())
        else {
            warn!(
                target: "bff.task.jwks_refresher",
                interval_seconds = period.as_secs(),
                "JWKS refresh interval unusable, scheduled refresh disabled"
            );
            cancel_token.cancelled().await;
            return;
        };

        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = key_set.refresh(RefreshTrigger::Scheduled).await {
                        warn!(
                            target: "bff.task.jwks_refresher",
                            error = %e,
                            "Scheduled JWKS refresh failed, will retry next interval"
                        );
                    }
                }
                () = cancel_token.cancelled() => {
                    info!(target: "bff.task.jwks_refresher", "JWKS refresher received shutdown signal, exiting");
                    break;
                }
            }
        }
    }
    .instrument(tracing::info_span!("bff.task.jwks_refresher"))
    .await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::KeySetConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSA_N: &str = "v05HNxXVzZoo1VrEZX00HT3SGZxwT-dFkAKNcXG2aTczLqhDxjAzWV4M5go5VhT39NM_WiBGkErN6g1QddIeOisJR1jVjQw2Zmn4F_8f62s9b6BhyZUHGXZnAt8N3kqJODPZjqd7r5Z80cJx1s3koKosn4hsVo_x4jyWs83FQkXqwaRbdPlksaHDAOoSpTMX09uvSBANE0bm9BTBa3BpwlRMdnK0rKIWtL5tu6hBpoWLuYn6ddEIcwUXdoKydnGCb8AGr_oXcqC0W7aHXSrE1RVGzqC5hELVtHH_yYE0FI9dY-FMjT0zJz2500f8TjfmU6vMJTak7PsjThCJEdjEgw";

    fn jwks(kids: &[&str]) -> serde_json::Value {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| json!({"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": RSA_N, "e": "AQAB"}))
            .collect();
        json!({ "keys": keys })
    }

    #[tokio::test]
    async fn test_refresher_picks_up_rotated_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["old"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["old", "new"])))
            .mount(&server)
            .await;

        let mut config = KeySetConfig::new(format!("{}/certs", server.uri()));
        config.refresh_interval = Duration::from_millis(50);
        let key_set = Arc::new(KeySetCache::initialize(config).await.unwrap());
        assert_eq!(key_set.key_count().await, 1);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_jwks_refresher(Arc::clone(&key_set), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(key_set.key_count().await, 2);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should exit on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresher_failure_keeps_previous_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1", "k2"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = KeySetConfig::new(format!("{}/certs", server.uri()));
        config.refresh_interval = Duration::from_millis(30);
        let key_set = Arc::new(KeySetCache::initialize(config).await.unwrap());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_jwks_refresher(Arc::clone(&key_set), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(key_set.key_count().await, 2);
        assert!(key_set.get("k1").await.is_ok());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unrepresentable_interval_waits_for_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1"])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = KeySetConfig::new(format!("{}/certs", server.uri()));
        config.refresh_interval = Duration::MAX;
        let key_set = Arc::new(KeySetCache::initialize(config).await.unwrap());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_jwks_refresher(Arc::clone(&key_set), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should exit on cancel")
            .unwrap();
    }
}
