//! SinkHandle - one worker task per sink, fed from a small snapshot queue
//!
//! Snapshots are cumulative: a newer one makes every queued one stale. When
//! a slow transport falls behind, the oldest queued snapshot is evicted to
//! make room, so the newest state always reaches the sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace};

use contracts::{SnapshotSink, TelemetryFrame};

use crate::metrics::SinkMetrics;

/// Outcome of queueing one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Enqueued {
    /// Queued without displacing anything
    Queued,
    /// Queued; this older snapshot was evicted to make room
    Superseded(TelemetryFrame),
    /// The worker is gone
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<TelemetryFrame>,
    closed: bool,
}

/// Bounded latest-wins queue between the dispatcher and one worker
#[derive(Debug)]
struct SnapshotQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    capacity: usize,
}

impl SnapshotQueue {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Notify::new(),
            capacity,
        }
    }

    // Critical sections never panic, a poisoned lock still holds valid state
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, frame: TelemetryFrame) -> Enqueued {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Enqueued::Closed;
            }
            let evicted = if state.frames.len() >= self.capacity {
                state.frames.pop_front()
            } else {
                None
            };
            state.frames.push_back(frame);
            evicted.map_or(Enqueued::Queued, Enqueued::Superseded)
        };
        self.ready.notify_one();
        outcome
    }

    /// Next snapshot; `None` once closed and drained
    async fn pop(&self) -> Option<TelemetryFrame> {
        loop {
            {
                let mut state = self.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a push between the check and
            // this await is not lost
            self.ready.notified().await;
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    fn len(&self) -> usize {
        self.lock().frames.len()
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    queue: Arc<SnapshotQueue>,
    metrics: Arc<SinkMetrics>,
    worker_handle: Option<JoinHandle<()>>,
}

impl SinkHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: SnapshotSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let queue = Arc::new(SnapshotQueue::new(queue_capacity));
        let metrics = Arc::new(SinkMetrics::new(&name));

        let worker = tokio::spawn(sink_worker(
            sink,
            Arc::clone(&queue),
            Arc::clone(&metrics),
            name.clone(),
        ));

        Self {
            name,
            queue,
            metrics,
            worker_handle: Some(worker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a snapshot without waiting.
    ///
    /// A full queue evicts its oldest entry, counted as dropped. Returns
    /// false only when the worker has stopped.
    pub fn try_send(&self, frame: TelemetryFrame) -> bool {
        match self.queue.push(frame) {
            Enqueued::Queued => {
                self.metrics.set_queue_len(self.queue.len());
                true
            }
            Enqueued::Superseded(stale) => {
                self.metrics.inc_dropped_count();
                debug!(
                    sink = %self.name,
                    stale_seq = stale.seq,
                    seq = frame.seq,
                    "Queue full, oldest snapshot superseded"
                );
                true
            }
            Enqueued::Closed => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Close the queue and wait for the worker to drain it
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(mut self) {
        self.queue.close();
        if let Some(worker) = self.worker_handle.take() {
            if let Err(e) = worker.await {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
            }
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        // Lets a detached worker drain and exit
        self.queue.close();
    }
}

#[instrument(name = "sink_worker_loop", skip(sink, queue, metrics), fields(sink = %name))]
async fn sink_worker<S: SnapshotSink>(
    mut sink: S,
    queue: Arc<SnapshotQueue>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(frame) = queue.pop().await {
        metrics.set_queue_len(queue.len());

        match sink.write(&frame).await {
            Ok(()) => {
                metrics.inc_write_count();
                trace!(sink = %name, seq = frame.seq, "Snapshot written");
            }
            Err(e) => {
                // A failing transport never stops the others
                metrics.inc_failure_count();
                error!(sink = %name, seq = frame.seq, error = %e, "Write failed");
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, MetricsSnapshot};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Records the step counts it was handed
    struct RecordingSink {
        name: String,
        seen: Arc<Mutex<Vec<u32>>>,
        should_fail: bool,
        delay_ms: u64,
        flushed: Arc<AtomicU64>,
    }

    impl RecordingSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                seen: Arc::new(Mutex::new(Vec::new())),
                should_fail: false,
                delay_ms: 0,
                flushed: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl SnapshotSink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "transport down"));
            }
            self.seen.lock().unwrap().push(frame.metrics.step_count);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.flushed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn frame(steps: u32) -> TelemetryFrame {
        TelemetryFrame::from_metrics(
            u64::from(steps),
            steps * 500,
            MetricsSnapshot {
                step_count: steps,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_queue_evicts_oldest() {
        let queue = SnapshotQueue::new(2);
        assert_eq!(queue.push(frame(1)), Enqueued::Queued);
        assert_eq!(queue.push(frame(2)), Enqueued::Queued);
        assert_eq!(queue.push(frame(3)), Enqueued::Superseded(frame(1)));
        assert_eq!(queue.len(), 2);

        queue.close();
        assert_eq!(queue.push(frame(4)), Enqueued::Closed);
    }

    #[tokio::test]
    async fn test_queue_drains_after_close() {
        let queue = SnapshotQueue::new(4);
        queue.push(frame(1));
        queue.push(frame(2));
        queue.close();

        assert_eq!(queue.pop().await.map(|f| f.metrics.step_count), Some(1));
        assert_eq!(queue.pop().await.map(|f| f.metrics.step_count), Some(2));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_sink_handle_writes_in_order() {
        let sink = RecordingSink::new("session");
        let seen = Arc::clone(&sink.seen);
        let flushed = Arc::clone(&sink.flushed);

        let handle = SinkHandle::spawn(sink, 10);
        for steps in 0..5 {
            assert!(handle.try_send(frame(steps)));
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(metrics.write_count(), 5);
        assert_eq!(flushed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_slow_sink_still_gets_latest_snapshot() {
        let mut sink = RecordingSink::new("ble");
        sink.delay_ms = 50;
        let seen = Arc::clone(&sink.seen);

        let handle = SinkHandle::spawn(sink, 2);
        for steps in 1..=10 {
            assert!(handle.try_send(frame(steps)));
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&10), "newest snapshot lost: {seen:?}");
        assert!(metrics.dropped_count() > 0);
        assert_eq!(seen.len() as u64 + metrics.dropped_count(), 10);
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let mut sink = RecordingSink::new("failing");
        sink.should_fail = true;

        let handle = SinkHandle::spawn(sink, 10);
        for steps in 0..3 {
            handle.try_send(frame(steps));
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failure_count(), 3);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_worker() {
        let sink = RecordingSink::new("detached");
        let flushed = Arc::clone(&sink.flushed);

        let handle = SinkHandle::spawn(sink, 4);
        handle.try_send(frame(1));
        drop(handle);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(flushed.load(Ordering::Relaxed), 1);
    }
}
