//! Simulated workload behind `/work`.
//!
//! # Data Flow
//! ```text
//! GET /work
//!     → timer.rs (start latency clock)
//!     → source.rs (sample latency, sleep, decide failure)
//!     → RedMetrics (count request with resulting status)
//!     → timer.rs (record elapsed exactly once)
//! ```
//!
//! # Design Decisions
//! - Randomness is injected through `OutcomeSource` so tests can force outcomes
//! - Latency is measured, not copied from the sample; sleep overhead is part of it
//! - Parameters are fixed constants
//! - Handlers use `run_to_completion`: a client hanging up never leaves a
//!   timed observation without its request count

pub mod source;
pub mod timer;

pub use source::{FixedOutcome, LatencyRange, OutcomeSource, RandomOutcome};
pub use timer::DurationTimer;

use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceError;
use crate::observability::metrics::RedMetrics;

pub const WORK_METHOD: &str = "GET";
pub const WORK_PATH: &str = "/work";

/// Probability that a single call reports a simulated downstream error.
pub const FAILURE_RATE: f64 = 0.08;

/// Simulated service time.
pub const LATENCY: LatencyRange = LatencyRange {
    min: Duration::from_millis(20),
    max: Duration::from_millis(250),
};

/// Outcome of a successful simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkDone;

/// Sleep-then-maybe-fail workload with RED instrumentation.
#[derive(Clone)]
pub struct Workload {
    metrics: Arc<RedMetrics>,
    source: Arc<dyn OutcomeSource>,
}

impl Workload {
    pub fn new(metrics: Arc<RedMetrics>, source: Arc<dyn OutcomeSource>) -> Self {
        Self { metrics, source }
    }

    /// Run one simulated request.
    ///
    /// Latency is recorded for both outcomes; the request counter is labelled
    /// with the status the caller will see.
    pub async fn run(&self) -> Result<WorkDone, ServiceError> {
        let timer = DurationTimer::start(&self.metrics, WORK_METHOD, WORK_PATH);

        let latency = self.source.latency(&LATENCY);
        tokio::time::sleep(latency).await;

        let outcome = if self.source.should_fail(FAILURE_RATE) {
            Err(ServiceError::Simulated)
        } else {
            Ok(WorkDone)
        };

        let status = match &outcome {
            Ok(_) => 200,
            Err(e) => e.status().as_u16(),
        };
        self.metrics.record_request(WORK_METHOD, WORK_PATH, status);

        let elapsed = timer.observe();
        match &outcome {
            Ok(_) => tracing::debug!(latency_ms = elapsed.as_millis() as u64, "Work completed"),
            Err(e) => tracing::warn!(
                latency_ms = elapsed.as_millis() as u64,
                error = %e,
                "Work failed"
            ),
        }

        outcome
    }

    /// Run one simulated request on its own task and wait for it.
    ///
    /// Dropping the returned future (client disconnect) does not cancel the
    /// work; it finishes and is fully recorded in the background.
    pub async fn run_to_completion(&self) -> Result<WorkDone, ServiceError> {
        let work = self.clone();
        match tokio::spawn(async move { work.run().await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::warn!(error = %e, "Work task cancelled");
                Err(ServiceError::Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::LATENCY_BUCKETS;

    fn workload(source: FixedOutcome) -> (Workload, Arc<RedMetrics>) {
        let metrics = Arc::new(RedMetrics::new());
        (Workload::new(metrics.clone(), Arc::new(source)), metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_latency_lands_in_buckets() {
        let (work, metrics) = workload(FixedOutcome::succeed(Duration::from_millis(30)));

        assert_eq!(work.run().await, Ok(WorkDone));

        let snap = metrics.latency(WORK_METHOD, WORK_PATH).unwrap();
        assert_eq!(snap.count, 1);
        assert!((snap.sum - 0.03).abs() < 5e-3, "sum was {}", snap.sum);
        for (le, count) in LATENCY_BUCKETS.iter().zip(&snap.buckets) {
            let expected = if *le >= 0.05 { 1 } else { 0 };
            assert_eq!(*count, expected, "bucket le={}", le);
        }
        assert_eq!(metrics.requests(WORK_METHOD, WORK_PATH, 200), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_failure_counts_500() {
        let (work, metrics) = workload(FixedOutcome::fail(Duration::from_millis(20)));

        assert_eq!(work.run().await, Err(ServiceError::Simulated));

        assert_eq!(metrics.requests(WORK_METHOD, WORK_PATH, 500), 1);
        assert_eq!(metrics.requests(WORK_METHOD, WORK_PATH, 200), 0);
        // Failures are timed too
        assert_eq!(metrics.latency(WORK_METHOD, WORK_PATH).unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_still_completes() {
        let (work, metrics) = workload(FixedOutcome::succeed(Duration::from_millis(200)));

        // Caller gives up halfway through the simulated latency
        let abandoned = tokio::time::timeout(Duration::from_millis(50), work.run_to_completion()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;

        let counted = metrics.requests(WORK_METHOD, WORK_PATH, 200)
            + metrics.requests(WORK_METHOD, WORK_PATH, 500);
        let timed = metrics.latency(WORK_METHOD, WORK_PATH).unwrap();
        assert_eq!(counted, 1);
        assert_eq!(timed.count, counted);
        assert!(timed.sum >= 0.2, "latency cut short: {}", timed.sum);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_to_completion_returns_outcome() {
        let (work, metrics) = workload(FixedOutcome::fail(Duration::from_millis(20)));

        assert_eq!(work.run_to_completion().await, Err(ServiceError::Simulated));
        assert_eq!(metrics.requests(WORK_METHOD, WORK_PATH, 500), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_call_counted_once() {
        let metrics = Arc::new(RedMetrics::new());
        let work = Workload::new(metrics.clone(), Arc::new(RandomOutcome));

        let n = 50;
        for _ in 0..n {
            let _ = work.run().await;
        }

        let ok = metrics.requests(WORK_METHOD, WORK_PATH, 200);
        let failed = metrics.requests(WORK_METHOD, WORK_PATH, 500);
        assert_eq!(ok + failed, n);
        assert_eq!(metrics.latency(WORK_METHOD, WORK_PATH).unwrap().count, n);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_lose_nothing() {
        let metrics = Arc::new(RedMetrics::new());
        let work = Workload::new(metrics.clone(), Arc::new(RandomOutcome));

        let callers = 8;
        let per_caller = 25;
        let mut tasks = Vec::new();
        for _ in 0..callers {
            let work = work.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..per_caller {
                    let _ = work.run().await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let total = metrics.requests(WORK_METHOD, WORK_PATH, 200)
            + metrics.requests(WORK_METHOD, WORK_PATH, 500);
        assert_eq!(total, callers * per_caller);
    }
}
