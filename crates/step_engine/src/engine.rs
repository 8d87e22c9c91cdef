//! Step engine runtime wrapper.
//!
//! Owns exactly one detector and feeds it from raw motion samples. This is
//! the only object the sampling loop talks to.

use contracts::{
    DetectorKind, MetricsSnapshot, MotionSample, StepConfig, StepDetector, TickMs,
};
use tracing::{debug, info, instrument, warn};

use crate::advanced::AdvancedStepDetector;
use crate::basic::BasicStepDetector;
use crate::magnitude::sample_magnitude;

/// Build a boxed detector of the requested variant
pub fn create_detector(kind: DetectorKind, config: StepConfig) -> Box<dyn StepDetector> {
    match kind {
        DetectorKind::Basic => Box::new(BasicStepDetector::new(config)),
        DetectorKind::Advanced => Box::new(AdvancedStepDetector::new(config)),
    }
}

/// Engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Samples fed to the detector
    pub samples: u64,
    /// Samples dropped because their magnitude was not finite
    pub rejected_samples: u64,
    /// Resets performed
    pub resets: u64,
}

/// Single-owner step engine
pub struct StepEngine {
    detector: Box<dyn StepDetector>,
    stats: EngineStats,
}

impl std::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEngine")
            .field("kind", &self.detector.kind())
            .field("step_count", &self.detector.step_count())
            .field("stats", &self.stats)
            .finish()
    }
}

impl StepEngine {
    /// Create an engine around a new detector
    pub fn new(kind: DetectorKind, config: StepConfig) -> Self {
        info!(
            detector = %kind,
            step_length_m = config.step_length_m,
            user_weight_kg = config.user_weight_kg,
            "step engine created"
        );
        Self::with_detector(create_detector(kind, config))
    }

    /// Wrap an existing detector
    pub fn with_detector(detector: Box<dyn StepDetector>) -> Self {
        Self {
            detector,
            stats: EngineStats::default(),
        }
    }

    pub fn kind(&self) -> DetectorKind {
        self.detector.kind()
    }

    /// Read-only access to the detector
    pub fn detector(&self) -> &dyn StepDetector {
        self.detector.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Feed one sample read at `now_ms`. Returns `true` iff a step was accepted.
    pub fn process(&mut self, sample: &MotionSample, now_ms: TickMs) -> bool {
        self.try_process(sample, now_ms).unwrap_or(false)
    }

    /// Like [`process`](Self::process), but `None` when the sample was rejected.
    ///
    /// A non-finite magnitude is a driver fault: the sample is dropped and
    /// the detector is left untouched.
    #[instrument(level = "trace", name = "step_engine_process", skip(self, sample))]
    pub fn try_process(&mut self, sample: &MotionSample, now_ms: TickMs) -> Option<bool> {
        let magnitude = sample_magnitude(sample);
        if !magnitude.is_finite() {
            self.stats.rejected_samples += 1;
            metrics::counter!("pedometer_rejected_samples_total").increment(1);
            warn!(now_ms, "dropping sample with non-finite magnitude");
            return None;
        }

        self.stats.samples += 1;
        let stepped = self.detector.update(magnitude, now_ms);
        if stepped {
            metrics::counter!("pedometer_steps_total", "detector" => self.kind().as_str())
                .increment(1);
        }
        Some(stepped)
    }

    /// Copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.detector.snapshot()
    }

    /// Start a new session
    pub fn reset(&mut self) {
        let previous = self.detector.step_count();
        self.detector.reset();
        self.stats.resets += 1;
        debug!(previous_steps = previous, "session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ActivityClass;

    fn at_rest() -> MotionSample {
        MotionSample::from_accel(0.0, 0.0, 1.0)
    }

    #[test]
    fn test_create_detector_kinds() {
        let basic = create_detector(DetectorKind::Basic, StepConfig::default());
        let advanced = create_detector(DetectorKind::Advanced, StepConfig::default());
        assert_eq!(basic.kind(), DetectorKind::Basic);
        assert_eq!(advanced.kind(), DetectorKind::Advanced);
    }

    #[test]
    fn test_engine_at_rest() {
        let mut engine = StepEngine::new(DetectorKind::Advanced, StepConfig::default());
        for i in 0..100u32 {
            assert!(!engine.process(&at_rest(), i * 50));
        }

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.step_count, 0);
        assert_eq!(snapshot.speed_mps, 0.0);
        assert_eq!(snapshot.activity, ActivityClass::Immobile);
        assert_eq!(engine.stats().samples, 100);
    }

    #[test]
    fn test_engine_drops_non_finite_samples() {
        let mut engine = StepEngine::new(DetectorKind::Basic, StepConfig::default());
        let bad = MotionSample::from_accel(f32::NAN, 0.0, 1.0);
        assert!(!engine.process(&bad, 0));
        assert!(!engine.process(&MotionSample::from_accel(f32::INFINITY, 0.0, 0.0), 50));

        let stats = engine.stats();
        assert_eq!(stats.rejected_samples, 2);
        assert_eq!(stats.samples, 0);

        assert_eq!(engine.try_process(&bad, 100), None);
        assert_eq!(engine.try_process(&at_rest(), 150), Some(false));
        assert_eq!(engine.stats().rejected_samples, 3);
    }

    #[test]
    fn test_engine_counts_basic_steps() {
        let mut engine = StepEngine::new(DetectorKind::Basic, StepConfig::default());
        for i in 0..20u32 {
            engine.process(&at_rest(), i * 50);
        }
        assert!(engine.process(&MotionSample::from_accel(0.0, 0.0, 3.0), 1000));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.step_count, 1);
        assert!((snapshot.distance_m - 0.7).abs() < 1e-6);
        assert!((snapshot.calories - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_engine_reset() {
        let mut engine = StepEngine::new(DetectorKind::Basic, StepConfig::default());
        for i in 0..20u32 {
            engine.process(&at_rest(), i * 50);
        }
        engine.process(&MotionSample::from_accel(0.0, 0.0, 3.0), 1000);

        engine.reset();
        assert_eq!(engine.snapshot().step_count, 0);
        assert_eq!(engine.stats().resets, 1);
        assert_eq!(engine.kind(), DetectorKind::Basic);
    }
}
