//! Bounded-concurrency fan-out.
//!
//! Runs one independent downstream operation per target with at most
//! `concurrency` in flight, and resolves to either every target's payload
//! or the first failure drained.
//!
//! - Every target is attempted; the cap throttles, it never skips.
//! - Results are keyed by target. Completion order is not submission order.
//! - On the first drained error, or when the request's cancellation token
//!   fires, the remaining workers are aborted. No worker outlives `run`.
//! - The permit pool belongs to one job and is never shared across requests.

use crate::observability::metrics;
use crate::services::downstream::DownstreamError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default fan-out concurrency cap.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Why a fan-out failed.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// The first failed target, as drained.
    #[error("{target}: {source}")]
    Downstream {
        target: String,
        source: DownstreamError,
    },

    #[error("aggregation cancelled")]
    Cancelled,

    /// A worker panicked or was aborted externally.
    #[error("aggregation worker failed: {0}")]
    WorkerFailed(String),
}

/// A team as a fan-out target. Displays as `team N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TeamTarget(pub i64);

impl fmt::Display for TeamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {}", self.0)
    }
}

/// Targets plus a concurrency cap. Built per inbound request.
#[derive(Debug, Clone)]
pub struct AggregationJob<K> {
    targets: Vec<K>,
    concurrency: usize,
}

impl<K> AggregationJob<K> {
    /// The cap is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(targets: Vec<K>, concurrency: usize) -> Self {
        Self {
            targets,
            concurrency: concurrency.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    pub fn targets(&self) -> &[K] {
        &self.targets
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Execute `job`, calling `op` once per target.
///
/// Each worker acquires a permit from the job's pool before its operation
/// starts, so at most `job.concurrency()` operations run at once.
///
/// # Errors
///
/// - `Downstream` - first failure drained, attributed to its target
/// - `Cancelled` - `cancel` fired, or an operation reported cancellation
/// - `WorkerFailed` - a worker task panicked
#[instrument(skip_all, name = "bff.aggregator.run", fields(targets = job.len(), concurrency = job.concurrency()))]
pub async fn run<K, T, F, Fut>(
    job: AggregationJob<K>,
    cancel: &CancellationToken,
    op: F,
) -> Result<Vec<(K, T)>, AggregationError>
where
    K: fmt::Display + Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, DownstreamError>> + Send + 'static,
{
    let total = job.len();
    metrics::record_fanout_targets(total);

    let permits = Arc::new(Semaphore::new(job.concurrency));
    let mut workers = JoinSet::new();

    for target in job.targets {
        let permits = Arc::clone(&permits);
        let call = op(target.clone());
        workers.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (target, Err(DownstreamError::Cancelled));
            };
            (target, call.await)
        });
    }

    let mut results = Vec::with_capacity(total);

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                workers.abort_all();
                tracing::debug!(target: "bff.services.aggregator", completed = results.len(), total, "Fan-out cancelled");
                return Err(AggregationError::Cancelled);
            }
            next = workers.join_next() => next,
        };

        match next {
            None => break,
            Some(Ok((target, Ok(payload)))) => results.push((target, payload)),
            Some(Ok((_, Err(DownstreamError::Cancelled)))) => {
                workers.abort_all();
                return Err(AggregationError::Cancelled);
            }
            Some(Ok((target, Err(source)))) => {
                workers.abort_all();
                tracing::warn!(
                    target: "bff.services.aggregator",
                    failed_target = %target,
                    error = %source,
                    completed = results.len(),
                    total,
                    "Fan-out failed, discarding remaining results"
                );
                return Err(AggregationError::Downstream {
                    target: target.to_string(),
                    source,
                });
            }
            Some(Err(join_error)) => {
                workers.abort_all();
                tracing::error!(target: "bff.services.aggregator", error = %join_error, "Fan-out worker failed");
                return Err(AggregationError::WorkerFailed(join_error.to_string()));
            }
        }
    }

    tracing::debug!(target: "bff.services.aggregator", total, "Fan-out complete");
    Ok(results)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::errors::BffError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct InFlightTracker {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        attempted: AtomicUsize,
        finished: AtomicUsize,
    }

    impl InFlightTracker {
        async fn observe(&self, hold: Duration) {
            self.attempted.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_never_exceeded() {
        let tracker = Arc::new(InFlightTracker::default());
        let job = AggregationJob::new(vec![1, 2, 3, 4, 5], 2);

        let results = run(job, &CancellationToken::new(), |target: i64| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.observe(Duration::from_millis(30)).await;
                Ok(target * 10)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(tracker.attempted.load(Ordering::SeqCst), 5);
        assert!(tracker.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_results_keyed_by_target() {
        let job = AggregationJob::new(vec![3, 1, 2], 6);

        let results = run(job, &CancellationToken::new(), |target: i64| async move {
            // Later targets finish first.
            tokio::time::sleep(Duration::from_millis((4 - target as u64) * 10)).await;
            Ok(format!("payload-{target}"))
        })
        .await
        .unwrap();

        let by_target: HashMap<i64, String> = results.into_iter().collect();
        assert_eq!(by_target.len(), 3);
        assert_eq!(by_target.get(&2).map(String::as_str), Some("payload-2"));
    }

    #[tokio::test]
    async fn test_failure_of_target_three_fails_whole_job() {
        let job = AggregationJob::new(vec![1, 2, 3, 4, 5], 2);

        let err = run(job, &CancellationToken::new(), |target: i64| async move {
            if target == 3 {
                return Err(DownstreamError::Status {
                    method: reqwest::Method::GET,
                    url: "http://tasks/auth/tasks?teamid=3".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(target)
        })
        .await
        .unwrap_err();

        match err {
            AggregationError::Downstream { target, source } => {
                assert_eq!(target, "3");
                assert!(matches!(source, DownstreamError::Status { status: 500, .. }));
            }
            other => panic!("expected Downstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_team_two_timeout_scenario() {
        let job = AggregationJob::new(vec![TeamTarget(1), TeamTarget(2), TeamTarget(3)], 6);

        let err = run(job, &CancellationToken::new(), |team: TeamTarget| async move {
            if team.0 == 2 {
                Err(DownstreamError::Timeout)
            } else {
                Ok(vec![team.0])
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "team 2: timeout");
        match BffError::aggregation("TaskAPI", &err) {
            BffError::GatewayTimeout(msg) => assert_eq!(msg, "TaskAPI: team 2: timeout"),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_workers() {
        let tracker = Arc::new(InFlightTracker::default());
        let cancel = CancellationToken::new();
        let job = AggregationJob::new(vec![1, 2, 3], 2);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = run(job, &cancel, |target: i64| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.observe(Duration::from_secs(10)).await;
                Ok(target)
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AggregationError::Cancelled));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.finished.load(Ordering::SeqCst), 0);
        assert!(tracker.attempted.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_job_succeeds() {
        let job: AggregationJob<i64> = AggregationJob::new(Vec::new(), 6);

        let results = run(job, &CancellationToken::new(), |t: i64| async move { Ok(t) })
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[test]
    fn test_concurrency_cap_clamped() {
        let job = AggregationJob::new(vec![TeamTarget(1)], 0);
        assert_eq!(job.concurrency(), 1);
        assert_eq!(TeamTarget(7).to_string(), "team 7");

        let huge = AggregationJob::new(vec![TeamTarget(1)], usize::MAX);
        assert_eq!(huge.concurrency(), Semaphore::MAX_PERMITS);
    }
}
