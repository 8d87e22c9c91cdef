//! # Ingestion Pipeline
//!
//! Sensor sample ingestion module.
//!
//! Responsibilities:
//! - Provide sample sources (synthetic gait, recorded session replay)
//! - Bridge the source callback to an async channel
//! - Backpressure management and drop policy
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{build_source, BackpressureConfig, IngestionPipeline};
//!
//! let source = build_source(&blueprint.source, blueprint.sampling.period_ms)?;
//! let mut pipeline = IngestionPipeline::new(source, BackpressureConfig::default());
//! let rx = pipeline.take_receiver().unwrap();
//! pipeline.start();
//!
//! while let Ok(packet) = rx.recv().await {
//!     engine.process(&packet.sample, packet.timestamp_ms);
//! }
//! ```

mod config;
mod error;
mod factory;
mod pipeline;
mod replay;
mod synthetic;

pub use config::{BackpressureConfig, BackpressurePolicy, IngestionMetrics, IngestionStats};
pub use error::{IngestionError, Result};
pub use factory::build_source;
pub use pipeline::IngestionPipeline;
pub use replay::{read_recording, write_recording, ReplayConfig, ReplaySource};
pub use synthetic::{gait_waveform, synthetic_sample, SyntheticGaitConfig, SyntheticGaitSource};

// Re-export for convenience
pub use async_channel::Receiver;
pub use contracts::{SamplePacket, SampleSource};
