//! Build a sample source from configuration.

use contracts::{SampleSource, SourceConfig, SourceKind};
use tracing::info;

use crate::error::{IngestionError, Result};
use crate::replay::{ReplayConfig, ReplaySource};
use crate::synthetic::{SyntheticGaitConfig, SyntheticGaitSource};

/// Create the configured source.
///
/// `period_ms` is the sampling period; only the synthetic source uses it.
pub fn build_source(config: &SourceConfig, period_ms: u32) -> Result<Box<dyn SampleSource>> {
    match config.kind {
        SourceKind::Synthetic => {
            info!(
                cadence_hz = config.cadence_hz,
                amplitude_g = config.amplitude_g,
                "using synthetic gait source"
            );
            Ok(Box::new(SyntheticGaitSource::new(
                "synthetic",
                SyntheticGaitConfig {
                    period_ms,
                    cadence_hz: config.cadence_hz,
                    amplitude_g: config.amplitude_g,
                    noise_g: config.noise_g,
                    duration_ms: config.duration_ms,
                    seed: config.seed,
                    realtime: config.realtime,
                    ..Default::default()
                },
            )))
        }
        SourceKind::Replay => {
            let path = config.path.as_ref().ok_or(IngestionError::MissingField {
                source_name: "replay".to_string(),
                field: "path",
            })?;
            let source = ReplaySource::load(
                path,
                "replay",
                ReplayConfig {
                    speed_multiplier: config.speed_multiplier,
                    loop_playback: config.loop_playback,
                    realtime: config.realtime,
                },
            )?;
            Ok(Box::new(source))
        }
    }
}
