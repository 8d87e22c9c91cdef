//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// What to do when the sampling loop falls behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Drop the incoming sample; the source never waits
    #[default]
    DropNewest,
    /// Park the source thread until the loop catches up
    Block,
}

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Channel capacity
    pub channel_capacity: usize,

    /// Policy when full
    pub policy: BackpressurePolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            policy: BackpressurePolicy::DropNewest,
        }
    }
}

impl BackpressureConfig {
    /// Create new backpressure configuration
    pub fn new(channel_capacity: usize, policy: BackpressurePolicy) -> Self {
        Self {
            channel_capacity,
            policy,
        }
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total samples received from the source
    pub samples_received: AtomicU64,

    /// Total samples dropped
    pub samples_dropped: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record sample received
    pub fn record_received(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record sample dropped
    pub fn record_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Update queue length
    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> IngestionStats {
        IngestionStats {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub samples_received: u64,
    pub samples_dropped: u64,
    pub queue_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IngestionMetrics::new();
        metrics.record_received();
        metrics.record_received();
        metrics.record_dropped();
        metrics.update_queue_len(3);

        let stats = metrics.snapshot();
        assert_eq!(stats.samples_received, 2);
        assert_eq!(stats.samples_dropped, 1);
        assert_eq!(stats.queue_len, 3);
    }
}
