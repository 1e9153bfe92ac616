//! Latency timer that records exactly once.

use std::time::Duration;
use tokio::time::Instant;

use crate::observability::metrics::RedMetrics;

/// Measures a timed region and feeds the request latency histogram.
///
/// The elapsed time is recorded by [`observe`](Self::observe) or, if the
/// region is left early (error return, cancelled future), on drop.
pub struct DurationTimer<'a> {
    metrics: &'a RedMetrics,
    method: &'a str,
    path: &'a str,
    start: Instant,
    recorded: bool,
}

impl<'a> DurationTimer<'a> {
    pub fn start(metrics: &'a RedMetrics, method: &'a str, path: &'a str) -> Self {
        Self {
            metrics,
            method,
            path,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Stop the timer, record and return the elapsed time.
    pub fn observe(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.metrics
                .record_latency(self.method, self.path, elapsed.as_secs_f64());
        }
        elapsed
    }
}

impl Drop for DurationTimer<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.record();
        }
    }
}
