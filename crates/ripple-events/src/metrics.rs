//! Event-service counters and latency accumulator.
//!
//! The facade metrics (`metrics::counter!` etc.) feed the Prometheus
//! exporter; this accumulator additionally backs the service's own
//! `metrics()` snapshot so embedders without an exporter still get
//! numbers.

use std::time::Duration;

use parking_lot::Mutex;

/// Point-in-time view of the service counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Events processed, successful or not.
    pub total_events: u64,
    /// Events whose handler returned a response.
    pub successful_events: u64,
    /// Events that failed at any stage.
    pub failed_events: u64,
    /// Mean end-to-end processing latency.
    pub average_latency: Duration,
}

#[derive(Debug, Default)]
struct Accumulator {
    total: u64,
    successful: u64,
    failed: u64,
    total_latency: Duration,
}

/// Mutex-guarded metrics accumulator shared by concurrent invocations.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    inner: Mutex<Accumulator>,
}

impl ServiceMetrics {
    /// Create a zeroed accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully processed event.
    pub fn record_success(&self, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.total += 1;
        inner.successful += 1;
        inner.total_latency += latency;
    }

    /// Record one failed event.
    pub fn record_failure(&self, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.total += 1;
        inner.failed += 1;
        inner.total_latency += latency;
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        let average_latency = if inner.total == 0 {
            Duration::ZERO
        } else {
            inner.total_latency / u32::try_from(inner.total).unwrap_or(u32::MAX)
        };
        MetricsSnapshot {
            total_events: inner.total,
            successful_events: inner.successful,
            failed_events: inner.failed,
            average_latency,
        }
    }
}
