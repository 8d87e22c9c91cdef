//! Adaptive-threshold step detector.
//!
//! Works on the rectified derivative of the magnitude: a step is a smoothed
//! delta that stands out from the recent noise floor, at least
//! [`STEP_DEBOUNCE_MS`] after the previous accepted step.

use contracts::{ticks_diff, DetectorKind, StepConfig, StepDetector, TickMs};
use tracing::{debug, instrument};

use crate::projector;
use crate::window::SampleWindow;

/// Weight of the newest delta in the exponential moving average
pub const SMOOTHING_ALPHA: f32 = 0.3;

/// Number of smoothed deltas kept for the adaptive threshold
pub const THRESHOLD_WINDOW: usize = 20;

/// Lowest threshold ever used (g)
pub const THRESHOLD_FLOOR: f32 = 0.2;

/// Multiplier over the window mean
pub const THRESHOLD_GAIN: f32 = 1.5;

/// Minimum gap between two accepted steps (ms)
pub const STEP_DEBOUNCE_MS: i32 = 300;

/// Flat per-step energy estimate (kcal)
pub const KCAL_PER_STEP: f64 = 0.04;

/// Lightweight detector for tight sampling loops
#[derive(Debug)]
pub struct BasicStepDetector {
    config: StepConfig,
    prev_magnitude: f32,
    smoothed_delta: f32,
    window: SampleWindow,
    step_count: u32,
    step_times: Vec<TickMs>,
}

impl BasicStepDetector {
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            prev_magnitude: 0.0,
            smoothed_delta: 0.0,
            window: SampleWindow::new(THRESHOLD_WINDOW),
            step_count: 0,
            step_times: Vec::new(),
        }
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    fn threshold(&self) -> f32 {
        (self.window.mean() * THRESHOLD_GAIN).max(THRESHOLD_FLOOR)
    }

    /// Before the first step the debounce runs from tick 0.
    fn debounce_elapsed(&self, now_ms: TickMs) -> bool {
        let last = self.step_times.last().copied().unwrap_or(0);
        ticks_diff(now_ms, last) > STEP_DEBOUNCE_MS
    }
}

impl Default for BasicStepDetector {
    fn default() -> Self {
        Self::new(StepConfig::default())
    }
}

impl StepDetector for BasicStepDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Basic
    }

    #[instrument(level = "trace", name = "basic_update", skip(self))]
    fn update(&mut self, magnitude: f32, now_ms: TickMs) -> bool {
        let delta = (magnitude - self.prev_magnitude).abs();
        self.smoothed_delta =
            SMOOTHING_ALPHA * delta + (1.0 - SMOOTHING_ALPHA) * self.smoothed_delta;
        self.window.push(self.smoothed_delta);

        let threshold = self.threshold();
        let accepted = self.smoothed_delta > threshold && self.debounce_elapsed(now_ms);
        if accepted {
            self.step_count += 1;
            self.step_times.push(now_ms);
            debug!(
                step_count = self.step_count,
                smoothed = self.smoothed_delta,
                threshold,
                "step accepted"
            );
        }

        // Compared against the previous reading above; only now advance it.
        self.prev_magnitude = magnitude;
        accepted
    }

    fn step_count(&self) -> u32 {
        self.step_count
    }

    fn step_times(&self) -> &[TickMs] {
        &self.step_times
    }

    fn speed(&self) -> f32 {
        projector::base_speed(&self.step_times, self.config.step_length_m)
    }

    fn distance(&self) -> f32 {
        self.step_count as f32 * self.config.step_length_m
    }

    fn cadence(&self) -> f32 {
        projector::cadence_spm(&self.step_times)
    }

    fn calories(&self) -> f64 {
        f64::from(self.step_count) * KCAL_PER_STEP
    }

    fn reset(&mut self) {
        self.prev_magnitude = 0.0;
        self.smoothed_delta = 0.0;
        self.window.clear();
        self.step_count = 0;
        self.step_times.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut BasicStepDetector, samples: &[(f32, TickMs)]) -> Vec<TickMs> {
        samples
            .iter()
            .filter(|(mag, t)| detector.update(*mag, *t))
            .map(|(_, t)| *t)
            .collect()
    }

    #[test]
    fn test_fresh_detector_is_neutral() {
        let detector = BasicStepDetector::default();
        assert_eq!(detector.step_count(), 0);
        assert_eq!(detector.speed(), 0.0);
        assert_eq!(detector.cadence(), 0.0);
        assert_eq!(detector.distance(), 0.0);
        assert_eq!(detector.calories(), 0.0);
    }

    #[test]
    fn test_flat_signal_never_steps() {
        let mut detector = BasicStepDetector::default();
        // Settle the smoothing on the first reading, then hold perfectly still
        detector.update(1.0, 0);
        for i in 1..2000u32 {
            assert!(!detector.update(1.0, i * 50), "flat signal stepped at {}", i * 50);
        }
        assert_eq!(detector.step_count(), 0);
        assert!(detector.smoothed_delta < THRESHOLD_FLOOR);
    }

    #[test]
    fn test_sparse_spike_sequence() {
        // Only the 1.9 → 1.0 drop at t=700 clears the adaptive threshold:
        // the window mean is still inflated by the 1.0 start-up delta until then.
        let mut detector = BasicStepDetector::new(StepConfig::with_step_length(0.7));
        let samples = [
            (1.0, 0),
            (1.0, 50),
            (1.8, 100),
            (1.0, 350),
            (1.0, 400),
            (1.9, 450),
            (1.0, 700),
        ];

        let steps = feed(&mut detector, &samples);
        assert_eq!(steps, vec![700]);
        assert_eq!(detector.step_count(), 1);
        assert!((detector.distance() - 0.7).abs() < 1e-6);
        assert_eq!(detector.speed(), 0.0, "one step has no speed");
    }

    #[test]
    fn test_first_step_debounced_from_tick_zero() {
        let mut detector = BasicStepDetector::default();
        detector.update(1.0, 0);
        // Clears the adaptive threshold but lands inside the first 300ms
        assert!(!detector.update(4.0, 50));
        assert_eq!(detector.step_count(), 0);

        let mut detector = BasicStepDetector::default();
        detector.update(1.0, 0);
        assert!(detector.update(4.0, 350));
        assert_eq!(detector.step_times(), &[350]);
    }

    #[test]
    fn test_prev_magnitude_advances_after_compare() {
        let mut detector = BasicStepDetector::default();
        detector.update(1.5, 0);
        assert_eq!(detector.prev_magnitude, 1.5);
        // delta is measured against 1.5, not against the new reading
        detector.update(1.0, 50);
        assert!((detector.smoothed_delta - (0.3 * 0.5 + 0.7 * 0.45)).abs() < 1e-6);
        assert_eq!(detector.prev_magnitude, 1.0);
    }

    #[test]
    fn test_debounce_rejects_close_spikes() {
        let mut detector = BasicStepDetector::default();
        detector.update(1.0, 0);
        for i in 1..20u32 {
            detector.update(1.0, i * 50);
        }
        // Two large edges 150ms apart: the second one is ringing
        assert!(detector.update(3.0, 1000));
        assert!(!detector.update(1.0, 1150));
        assert_eq!(detector.step_count(), 1);

        // Past the debounce window a fresh edge counts again
        for i in 0..10u32 {
            detector.update(1.0, 1200 + i * 50);
        }
        assert!(detector.update(3.0, 1800));
        assert_eq!(detector.step_times(), &[1000, 1800]);
    }

    #[test]
    fn test_window_is_capped() {
        let mut detector = BasicStepDetector::default();
        for i in 0..100u32 {
            detector.update(1.0 + (i % 3) as f32 * 0.1, i * 50);
        }
        assert_eq!(detector.window.len(), THRESHOLD_WINDOW);
    }

    #[test]
    fn test_speed_from_regular_steps() {
        let mut detector = BasicStepDetector::default();
        detector.step_times = vec![0, 500, 1000, 1500, 2000];
        detector.step_count = 5;

        assert!((detector.speed() - 1.4).abs() < 1e-5);
        assert!((detector.cadence() - 120.0).abs() < 1e-3);
        assert!((detector.calories() - 0.2).abs() < 1e-12);
        assert!((detector.distance() - 3.5).abs() < 1e-5);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut detector = BasicStepDetector::default();
        detector.update(1.0, 0);
        for i in 1..20u32 {
            detector.update(1.0, i * 50);
        }
        detector.update(3.0, 1000);
        assert_eq!(detector.step_count(), 1);

        detector.reset();
        assert_eq!(detector.step_count(), 0);
        assert!(detector.step_times().is_empty());
        assert_eq!(detector.smoothed_delta, 0.0);
        assert!(detector.window.is_empty());
        assert_eq!(detector.config().step_length_m, 0.7);
    }

    #[test]
    fn test_step_count_is_monotonic() {
        let mut detector = BasicStepDetector::default();
        let mut last_count = 0;
        for i in 0..400u32 {
            let mag = 1.0 + ((i as f32) * 0.7).sin() * 0.8;
            detector.update(mag, i * 50);
            assert!(detector.step_count() >= last_count);
            last_count = detector.step_count();
        }
        assert!(detector.step_times().windows(2).all(|w| w[0] <= w[1]));
    }
}
