//! Dispatcher - fan-out of snapshots to sinks

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{ControlCommand, SinkConfig, SinkType, TelemetryFrame};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::SinkStats;
use crate::sinks::{FileSink, LogSink, NetworkSink, RadioSink};

/// Dispatcher configuration
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<TelemetryFrame>,
    control_tx: Option<mpsc::Sender<ControlCommand>>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<TelemetryFrame>) -> Self {
        Self {
            config,
            input_rx,
            control_tx: None,
        }
    }

    /// Route peer commands (radio `reset`) to the sampling loop
    pub fn with_control(mut self, control_tx: mpsc::Sender<ControlCommand>) -> Self {
        self.control_tx = Some(control_tx);
        self
    }

    /// Build every sink and start its worker
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config, self.control_tx.as_ref()).await?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config, control_tx),
        fields(sink_count = config.sinks.len())
    )]
    async fn initialize_handles(
        config: &DispatcherConfig,
        control_tx: Option<&mpsc::Sender<ControlCommand>>,
    ) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            match create_sink_handle(sink_config, control_tx).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Already-started workers must not outlive a failed build
                    Dispatcher::shutdown_handles(handles).await;
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config, control_tx),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn create_sink_handle(
    config: &SinkConfig,
    control_tx: Option<&mpsc::Sender<ControlCommand>>,
) -> Result<SinkHandle, DispatcherError> {
    let creation_error = |e| DispatcherError::sink_creation(config, e);

    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::from_params(&config.name, &config.params).map_err(creation_error)?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink =
                FileSink::from_params(&config.name, &config.params).map_err(creation_error)?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(creation_error)?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Radio => {
            let sink = RadioSink::from_params(&config.name, &config.params, control_tx.cloned())
                .await
                .map_err(creation_error)?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Fans frames out to every sink handle
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<TelemetryFrame>,
}

impl Dispatcher {
    /// Dispatcher over pre-built handles (for testing)
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<TelemetryFrame>,
    ) -> Self {
        Self { handles, input_rx }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    /// Counters for all sinks
    pub fn metrics(&self) -> Vec<(String, SinkStats)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Main loop; returns the final sink counters once the input closes
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, SinkStats)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut frame_count: u64 = 0;
        while let Some(frame) = self.input_rx.recv().await {
            frame_count += 1;
            self.dispatch_frame(frame);

            if frame_count.is_multiple_of(100) {
                debug!(frames = frame_count, "Dispatcher progress");
            }
        }

        info!(frames = frame_count, "Dispatcher input closed, shutting down");

        let metrics_handles: Vec<_> = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), std::sync::Arc::clone(h.metrics())))
            .collect();
        Self::shutdown_handles(self.handles).await;

        info!("Dispatcher shutdown complete");
        metrics_handles
            .into_iter()
            .map(|(name, m)| (name, m.snapshot()))
            .collect()
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, SinkStats)>> {
        tokio::spawn(self.run())
    }

    fn dispatch_frame(&self, frame: TelemetryFrame) {
        for handle in &self.handles {
            handle.try_send(frame);
        }
    }

    async fn shutdown_handles(handles: Vec<SinkHandle>) {
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

/// Build a dispatcher straight from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx, control_tx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<TelemetryFrame>,
    control_tx: Option<mpsc::Sender<ControlCommand>>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    let builder = DispatcherBuilder::new(config, input_rx);
    match control_tx {
        Some(tx) => builder.with_control(tx).build().await,
        None => builder.build().await,
    }
}
