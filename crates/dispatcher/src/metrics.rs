//! Per-sink counters
//!
//! Kept locally for the session summary and mirrored to the `metrics`
//! facade for the exporter.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single sink
#[derive(Debug)]
pub struct SinkMetrics {
    sink: String,
    /// Current queue length
    queue_len: AtomicUsize,
    /// Records handed to the transport
    write_count: AtomicU64,
    /// Transport errors
    failure_count: AtomicU64,
    /// Frames dropped due to a full queue
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            queue_len: AtomicUsize::new(0),
            write_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pedometer_snapshots_sent_total", "sink" => self.sink.clone())
            .increment(1);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pedometer_sink_errors_total", "sink" => self.sink.clone())
            .increment(1);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pedometer_sink_dropped_total", "sink" => self.sink.clone())
            .increment(1);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> SinkStats {
        SinkStats {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Copy of sink counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_metrics_snapshot() {
        let m = SinkMetrics::new("radio");
        m.inc_write_count();
        m.inc_write_count();
        m.inc_failure_count();
        m.inc_dropped_count();
        m.set_queue_len(3);

        assert_eq!(
            m.snapshot(),
            SinkStats {
                queue_len: 3,
                write_count: 2,
                failure_count: 1,
                dropped_count: 1,
            }
        );
    }
}
