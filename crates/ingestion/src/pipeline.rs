//! Ingestion Pipeline main entry

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{SampleCallback, SamplePacket, SampleSource};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{BackpressureConfig, BackpressurePolicy, IngestionMetrics};

/// Send sample, handling backpressure policy
#[inline]
fn send_sample(
    tx: &Sender<SamplePacket>,
    packet: SamplePacket,
    metrics: &IngestionMetrics,
    source_name: &str,
    policy: BackpressurePolicy,
) {
    let result = match policy {
        BackpressurePolicy::DropNewest => match tx.try_send(packet) {
            Err(TrySendError::Full(_)) => {
                metrics.record_dropped();
                trace!(source = %source_name, "sample dropped (newest)");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(()),
            Ok(()) => Ok(()),
        },
        BackpressurePolicy::Block => tx.send_blocking(packet).map_err(|_| ()),
    };

    if result.is_err() {
        trace!(source = %source_name, "channel closed");
    }
    metrics.update_queue_len(tx.len());
}

/// Ingestion Pipeline
///
/// Bridges one callback-driven `SampleSource` to a bounded channel the
/// sampling loop can await on. The channel closes once the source is
/// exhausted or stopped.
pub struct IngestionPipeline {
    source: Box<dyn SampleSource>,
    config: BackpressureConfig,
    metrics: Arc<IngestionMetrics>,
    tx: Option<Sender<SamplePacket>>,
    rx: Option<Receiver<SamplePacket>>,
    listening: Arc<AtomicBool>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline around a source
    pub fn new(source: Box<dyn SampleSource>, config: BackpressureConfig) -> Self {
        let (tx, rx) = bounded(config.channel_capacity.max(1));

        Self {
            source,
            config,
            metrics: Arc::new(IngestionMetrics::new()),
            tx: Some(tx),
            rx: Some(rx),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the source. Only the first call has an effect.
    #[instrument(name = "ingestion_start", skip(self), fields(source = %self.source.name()))]
    pub fn start(&mut self) {
        let Some(tx) = self.tx.take() else {
            debug!("ingestion already started");
            return;
        };

        self.listening.store(true, Ordering::SeqCst);
        let metrics = self.metrics.clone();
        let listening = self.listening.clone();
        let policy = self.config.policy;
        let source_name = self.source.name().to_string();

        let callback: SampleCallback = Arc::new(move |packet| {
            if !listening.load(Ordering::Relaxed) {
                return;
            }

            metrics.record_received();
            metrics::counter!("pedometer_samples_total", "source" => source_name.clone())
                .increment(1);
            send_sample(&tx, packet, &metrics, &source_name, policy);
        });

        info!(policy = ?policy, capacity = self.config.channel_capacity, "starting sample source");
        self.source.listen(callback);
    }

    /// Stop the source
    #[instrument(name = "ingestion_stop", skip(self), fields(source = %self.source.name()))]
    pub fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!("stopping sample source");
            self.source.stop();
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<SamplePacket>> {
        let rx = self.rx.take();
        if rx.is_none() {
            warn!(source = %self.source.name(), "receiver already taken");
        }
        rx
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Whether the source is still producing
    pub fn is_running(&self) -> bool {
        self.listening.load(Ordering::Relaxed) && self.source.is_listening()
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticGaitConfig, SyntheticGaitSource};

    fn bounded_gait(samples: u64) -> Box<dyn SampleSource> {
        Box::new(SyntheticGaitSource::new(
            "gait",
            SyntheticGaitConfig {
                duration_ms: Some(samples * 50),
                realtime: false,
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_pipeline_delivers_all_samples_when_blocking() {
        let mut pipeline = IngestionPipeline::new(
            bounded_gait(200),
            BackpressureConfig::new(4, BackpressurePolicy::Block),
        );
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start();

        let mut count = 0u64;
        let mut last_seq = None;
        while let Ok(packet) = rx.recv().await {
            if let Some(prev) = last_seq {
                assert_eq!(packet.seq, prev + 1);
            }
            last_seq = Some(packet.seq);
            count += 1;
        }

        assert_eq!(count, 200);
        let stats = pipeline.metrics().snapshot();
        assert_eq!(stats.samples_received, 200);
        assert_eq!(stats.samples_dropped, 0);
    }

    #[tokio::test]
    async fn test_pipeline_drops_when_full() {
        let mut pipeline = IngestionPipeline::new(
            bounded_gait(100),
            BackpressureConfig::new(2, BackpressurePolicy::DropNewest),
        );
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start();

        // Let the source run to completion without draining
        for _ in 0..200 {
            if !pipeline.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let mut delivered = 0u64;
        while let Ok(_) = rx.recv().await {
            delivered += 1;
        }

        let stats = pipeline.metrics().snapshot();
        assert_eq!(stats.samples_received, 100);
        assert_eq!(delivered + stats.samples_dropped, 100);
        assert!(stats.samples_dropped > 0);
    }

    #[test]
    fn test_receiver_taken_once() {
        let mut pipeline = IngestionPipeline::new(bounded_gait(1), BackpressureConfig::default());
        assert!(pipeline.take_receiver().is_some());
        assert!(pipeline.take_receiver().is_none());
    }
}
