//! Engine counters.
//!
//! Plain atomics bumped from the pipeline loop; a snapshot is logged at
//! shutdown and asserted on in tests. No metrics endpoint is exposed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub events_processed: AtomicU64,
    pub opportunities_detected: AtomicU64,
    /// Backpressure drops: queue overflow or the open-signal cap.
    pub opportunities_dropped: AtomicU64,
    pub signals_created: AtomicU64,
    pub signals_updated: AtomicU64,
    pub signals_expired: AtomicU64,
    pub signals_executed: AtomicU64,
    pub signals_denied: AtomicU64,
    pub evaluation_failures: AtomicU64,
    pub fatal_errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub opportunities_detected: u64,
    pub opportunities_dropped: u64,
    pub signals_created: u64,
    pub signals_updated: u64,
    pub signals_expired: u64,
    pub signals_executed: u64,
    pub signals_denied: u64,
    pub evaluation_failures: u64,
    pub fatal_errors: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            opportunities_detected: self.opportunities_detected.load(Ordering::Relaxed),
            opportunities_dropped: self.opportunities_dropped.load(Ordering::Relaxed),
            signals_created: self.signals_created.load(Ordering::Relaxed),
            signals_updated: self.signals_updated.load(Ordering::Relaxed),
            signals_expired: self.signals_expired.load(Ordering::Relaxed),
            signals_executed: self.signals_executed.load(Ordering::Relaxed),
            signals_denied: self.signals_denied.load(Ordering::Relaxed),
            evaluation_failures: self.evaluation_failures.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "events={} detected={} dropped={} created={} updated={} expired={} executed={} denied={} eval_failures={} fatal={}",
            self.events_processed,
            self.opportunities_detected,
            self.opportunities_dropped,
            self.signals_created,
            self.signals_updated,
            self.signals_expired,
            self.signals_executed,
            self.signals_denied,
            self.evaluation_failures,
            self.fatal_errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = EngineMetrics::new();
        EngineMetrics::incr(&metrics.signals_created);
        EngineMetrics::incr(&metrics.signals_created);
        EngineMetrics::incr(&metrics.opportunities_dropped);

        let snap = metrics.snapshot();
        assert_eq!(snap.signals_created, 2);
        assert_eq!(snap.opportunities_dropped, 1);
        assert_eq!(snap.signals_expired, 0);
    }
}
