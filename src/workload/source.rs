//! Sources of randomness for the simulated workload.

use rand::Rng;
use std::time::Duration;

/// Inclusive latency range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyRange {
    pub min: Duration,
    pub max: Duration,
}

/// Decides how long a simulated call takes and whether it fails.
pub trait OutcomeSource: Send + Sync {
    /// Sample the service time for one call.
    fn latency(&self, range: &LatencyRange) -> Duration;

    /// Bernoulli trial: `true` with probability `rate`.
    fn should_fail(&self, rate: f64) -> bool;
}

/// Thread-local RNG backed source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomOutcome;

impl OutcomeSource for RandomOutcome {
    fn latency(&self, range: &LatencyRange) -> Duration {
        if range.max <= range.min {
            return range.min;
        }
        rand::thread_rng().gen_range(range.min..=range.max)
    }

    fn should_fail(&self, rate: f64) -> bool {
        rand::thread_rng().gen_bool(rate.clamp(0.0, 1.0))
    }
}

/// Deterministic source: same latency and verdict on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedOutcome {
    pub latency: Duration,
    pub fail: bool,
}

impl FixedOutcome {
    pub fn succeed(latency: Duration) -> Self {
        Self { latency, fail: false }
    }

    pub fn fail(latency: Duration) -> Self {
        Self { latency, fail: true }
    }
}

impl OutcomeSource for FixedOutcome {
    fn latency(&self, _range: &LatencyRange) -> Duration {
        self.latency
    }

    fn should_fail(&self, _rate: f64) -> bool {
        self.fail
    }
}
