//! Pipeline orchestrator - coordinates all components.
//!
//! source -> ingestion channel -> sampling loop -> dispatcher -> sinks,
//! with radio `reset` commands flowing back into the sampling loop.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{ControlCommand, DetectorKind, DeviceBlueprint, TelemetryFrame};
use ingestion::{BackpressureConfig, BackpressurePolicy, IngestionPipeline};
use observability::{
    record_control_command, record_loop_latency_ms, record_snapshot_metrics, record_source_fault,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::CliError;

use super::sampling::{SampleOutcome, SamplingLoop};
use super::{PipelineStats, StopReason};

/// Capacity of the listener-to-loop command channel
const CONTROL_CHANNEL_CAPACITY: usize = 8;

/// How long the dispatcher gets to flush on shutdown
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The device blueprint
    pub blueprint: DeviceBlueprint,

    /// Stop after this long (None = until signal or source end)
    pub duration: Option<Duration>,

    /// Channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Pause after a sensor read fault
    pub fault_backoff: Duration,
}

impl PipelineConfig {
    pub fn new(blueprint: DeviceBlueprint) -> Self {
        Self {
            blueprint,
            duration: None,
            buffer_size: 64,
            metrics_port: None,
            fault_backoff: Duration::from_secs(1),
        }
    }

    /// Paced sources can't be throttled, so the newest sample is dropped
    /// when the loop falls behind. Unpaced sources wait instead.
    pub fn backpressure(&self) -> BackpressureConfig {
        let policy = if self.blueprint.source.realtime {
            BackpressurePolicy::DropNewest
        } else {
            BackpressurePolicy::Block
        };
        BackpressureConfig::new(self.buffer_size.max(1), policy)
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, the duration elapses or the source ends
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;
        let kind: DetectorKind = blueprint.detector.kind;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Setup source
        let source = ingestion::build_source(&blueprint.source, blueprint.sampling.period_ms)
            .map_err(CliError::from)?;
        let mut ingestion = IngestionPipeline::new(source, self.config.backpressure());
        let source_name = ingestion.source_name().to_string();
        let sample_rx = ingestion
            .take_receiver()
            .context("Failed to get ingestion receiver")?;

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - snapshots will only feed the session summary");
        }
        let (frame_tx, frame_rx) = mpsc::channel::<TelemetryFrame>(self.config.buffer_size.max(1));
        let (control_tx, mut control_rx) = mpsc::channel::<ControlCommand>(CONTROL_CHANNEL_CAPACITY);
        let dispatcher =
            dispatcher::create_dispatcher(blueprint.sinks.clone(), frame_rx, Some(control_tx))
                .await
                .map_err(CliError::from)?;
        let active_sinks = dispatcher.sink_names().len();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "Dispatcher started");

        let mut sampling = SamplingLoop::new(blueprint, kind);
        let mut stats = PipelineStats {
            detector: kind,
            source: source_name.clone(),
            active_sinks,
            ..Default::default()
        };
        let status_every = u64::from(blueprint.sampling.status_every.max(1));

        info!(
            device = %blueprint.device.name,
            detector = %kind,
            source = %source_name,
            period_ms = blueprint.sampling.period_ms,
            snapshot_interval_ms = blueprint.sampling.snapshot_interval_ms,
            duration = ?self.config.duration,
            "Pipeline running"
        );
        ingestion.start();

        let deadline = async {
            match self.config.duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);
        let mut control_open = true;

        // Samples stay queued in the ingestion channel while backing off
        let backoff = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(backoff);
        let mut backing_off = false;

        let stop_reason = loop {
            tokio::select! {
                _ = &mut shutdown => break StopReason::Signal,
                _ = &mut deadline => break StopReason::Duration,
                command = control_rx.recv(), if control_open => match command {
                    Some(command) => {
                        info!(?command, "Control command received");
                        record_control_command(command);
                        sampling.apply(command);
                        stats.control_commands += 1;
                    }
                    None => control_open = false,
                },
                () = &mut backoff, if backing_off => {
                    backing_off = false;
                    debug!("Fault backoff over, resuming sampling");
                }
                packet = sample_rx.recv(), if !backing_off => {
                    let Ok(packet) = packet else {
                        break StopReason::SourceExhausted;
                    };
                    let started = Instant::now();

                    match sampling.on_sample(&packet) {
                        SampleOutcome::Fault => {
                            stats.source_faults += 1;
                            record_source_fault(&source_name);
                            warn!(
                                seq = packet.seq,
                                now_ms = packet.timestamp_ms,
                                backoff_ms = self.config.fault_backoff.as_millis() as u64,
                                "Sensor read fault, backing off"
                            );
                            backoff
                                .as_mut()
                                .reset(tokio::time::Instant::now() + self.config.fault_backoff);
                            backing_off = true;
                            continue;
                        }
                        SampleOutcome::Processed { stepped, frame } => {
                            stats.samples_processed += 1;
                            if stepped {
                                stats.steps_detected += 1;
                            }
                            if let Some(frame) = frame {
                                publish(&frame_tx, frame, &mut stats);
                                if stats.snapshots_sent % status_every == 0 {
                                    log_status(&frame);
                                }
                            }
                        }
                    }

                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    record_loop_latency_ms(latency_ms);
                    stats.loop_latency.push(latency_ms);
                }
            }
        };

        // Shutdown
        info!(reason = %stop_reason, "Shutting down pipeline...");
        ingestion.stop();

        if let Some(frame) = sampling.final_frame() {
            publish(&frame_tx, frame, &mut stats);
        }
        drop(frame_tx);

        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(sink_stats)) => stats.sink_stats = sink_stats,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!(
                timeout_secs = DISPATCHER_DRAIN_TIMEOUT.as_secs(),
                "Dispatcher did not drain in time"
            ),
        }

        let ingestion_stats = ingestion.metrics().snapshot();
        stats.samples_received = ingestion_stats.samples_received;
        stats.samples_dropped = ingestion_stats.samples_dropped;
        stats.rejected_samples = sampling.engine_stats().rejected_samples;
        stats.stop_reason = Some(stop_reason);
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            steps = stats.session.total_steps(),
            snapshots = stats.snapshots_sent,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Hand a frame to the dispatcher without ever blocking the loop
fn publish(tx: &mpsc::Sender<TelemetryFrame>, frame: TelemetryFrame, stats: &mut PipelineStats) {
    record_snapshot_metrics(&frame.metrics);
    stats.session.update(&frame);

    match tx.try_send(frame) {
        Ok(()) => stats.snapshots_sent += 1,
        Err(mpsc::error::TrySendError::Full(_)) => {
            stats.snapshots_dropped += 1;
            metrics::counter!("pedometer_snapshots_dropped_total").increment(1);
            debug!(seq = frame.seq, "Dispatcher queue full, snapshot dropped");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            stats.snapshots_dropped += 1;
            warn!(seq = frame.seq, "Dispatcher channel closed");
        }
    }
}

fn log_status(frame: &TelemetryFrame) {
    let m = &frame.metrics;
    info!(
        steps = m.step_count,
        speed_mps = format!("{:.2}", m.speed_mps),
        cadence_spm = format!("{:.1}", m.cadence_spm),
        activity = %m.activity,
        temp_c = ?frame.temp_c,
        "Status"
    );
}
