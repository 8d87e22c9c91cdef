//! Multi-gate step detector with calorie accounting.
//!
//! A step is accepted only when three gates agree, evaluated in order:
//!
//! 1. **Zero crossing**: the gravity-free magnitude falls from positive to
//!    non-positive, at least [`CROSSING_DEBOUNCE_MS`] after the last crossing.
//! 2. **Peak validation**: the recent swing is large compared with the
//!    recent spread of the signal.
//! 3. **Frequency plausibility**: the recent step rate lies in
//!    [`MIN_STEP_RATE_HZ`, `MAX_STEP_RATE_HZ`].
//!
//! The crossing debounce is tracked on crossings, not on accepted steps.

use contracts::{ticks_diff, DetectorKind, StepConfig, StepDetector, TickMs};
use tracing::{debug, instrument, trace};

use crate::projector;
use crate::window::SampleWindow;

/// Standard gravity baseline removed from the magnitude (g)
pub const GRAVITY_G: f32 = 1.0;

/// Number of normalized samples retained for peak analysis
pub const HISTORY_LEN: usize = 50;

/// Minimum gap between two fired zero crossings (ms)
pub const CROSSING_DEBOUNCE_MS: i32 = 250;

/// History needed before a peak can be validated
pub const MIN_PEAK_HISTORY: usize = 5;

/// Samples examined by the peak gate
pub const PEAK_WINDOW: usize = 10;

/// Lowest peak threshold (g)
pub const PEAK_THRESHOLD_FLOOR: f32 = 0.3;

/// Accepted steps before the frequency gate engages
pub const FREQUENCY_WARMUP_STEPS: usize = 3;

pub const MIN_STEP_RATE_HZ: f32 = 1.0;
pub const MAX_STEP_RATE_HZ: f32 = 4.0;

/// Gate that turned a candidate down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Peak,
    Frequency,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Peak => "peak",
            Gate::Frequency => "frequency",
        }
    }
}

/// Zero-crossing / peak / frequency detector
#[derive(Debug)]
pub struct AdvancedStepDetector {
    config: StepConfig,
    prev_normalized: f32,
    last_zero_crossing: TickMs,
    history: SampleWindow,
    step_count: u32,
    step_times: Vec<TickMs>,
    total_calories: f64,
}

impl AdvancedStepDetector {
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            // Start above zero so the first negative reading counts as a crossing
            prev_normalized: GRAVITY_G,
            last_zero_crossing: 0,
            history: SampleWindow::new(HISTORY_LEN),
            step_count: 0,
            step_times: Vec::new(),
            total_calories: 0.0,
        }
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Gate 1. Records the crossing time whenever it fires; the first
    /// crossing is debounced against tick 0.
    fn detect_zero_crossing(&mut self, normalized: f32, now_ms: TickMs) -> bool {
        if !(self.prev_normalized > 0.0 && normalized <= 0.0) {
            return false;
        }

        let debounced = ticks_diff(now_ms, self.last_zero_crossing) > CROSSING_DEBOUNCE_MS;
        if debounced {
            self.last_zero_crossing = now_ms;
        }
        debounced
    }

    /// Gate 2.
    fn validate_peak(&self) -> bool {
        if self.history.len() < MIN_PEAK_HISTORY {
            return false;
        }

        let recent: Vec<f32> = self.history.tail(PEAK_WINDOW).map(f32::abs).collect();
        let n = recent.len() as f32;
        let mean = recent.iter().sum::<f32>() / n;
        let variance = recent.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
        let threshold = (mean + variance.sqrt()).max(PEAK_THRESHOLD_FLOOR);
        let peak = recent.iter().copied().fold(0.0_f32, f32::max);

        trace!(mean, threshold, peak, "peak check");
        peak > threshold
    }

    /// Gate 3.
    fn check_frequency(&self) -> bool {
        if self.step_times.len() < FREQUENCY_WARMUP_STEPS {
            return true;
        }

        match projector::step_rate_hz(&self.step_times) {
            Some(rate) => (MIN_STEP_RATE_HZ..=MAX_STEP_RATE_HZ).contains(&rate),
            None => true,
        }
    }

    fn evaluate_gates(&mut self, normalized: f32, now_ms: TickMs) -> Result<(), Option<Gate>> {
        if !self.detect_zero_crossing(normalized, now_ms) {
            return Err(None);
        }
        if !self.validate_peak() {
            return Err(Some(Gate::Peak));
        }
        if !self.check_frequency() {
            return Err(Some(Gate::Frequency));
        }
        Ok(())
    }

    fn accumulate_calories(&mut self) {
        let [.., prev, last] = self.step_times.as_slice() else {
            return;
        };
        let elapsed_ms = ticks_diff(*last, *prev);

        let met = projector::met_for_speed_kmh(self.speed() * 3.6);
        self.total_calories +=
            projector::calorie_increment(met, self.config.user_weight_kg, elapsed_ms);
    }
}

impl Default for AdvancedStepDetector {
    fn default() -> Self {
        Self::new(StepConfig::default())
    }
}

impl StepDetector for AdvancedStepDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Advanced
    }

    #[instrument(level = "trace", name = "advanced_update", skip(self))]
    fn update(&mut self, magnitude: f32, now_ms: TickMs) -> bool {
        let normalized = magnitude - GRAVITY_G;
        self.history.push(normalized);

        let accepted = match self.evaluate_gates(normalized, now_ms) {
            Ok(()) => {
                self.step_count += 1;
                self.step_times.push(now_ms);
                self.accumulate_calories();
                debug!(
                    step_count = self.step_count,
                    calories = self.total_calories,
                    "step accepted"
                );
                true
            }
            Err(Some(gate)) => {
                metrics::counter!("pedometer_gate_rejections_total", "gate" => gate.as_str())
                    .increment(1);
                trace!(gate = gate.as_str(), "crossing rejected");
                false
            }
            Err(None) => false,
        };

        self.prev_normalized = normalized;
        accepted
    }

    fn step_count(&self) -> u32 {
        self.step_count
    }

    fn step_times(&self) -> &[TickMs] {
        &self.step_times
    }

    fn speed(&self) -> f32 {
        projector::corrected_speed(&self.step_times, self.config.step_length_m)
    }

    fn distance(&self) -> f32 {
        self.step_count as f32 * self.config.step_length_m
    }

    fn cadence(&self) -> f32 {
        projector::cadence_spm(&self.step_times)
    }

    fn calories(&self) -> f64 {
        self.total_calories
    }

    /// Starts a new session. Crossing state is kept, so a crossing in
    /// progress is still debounced.
    fn reset(&mut self) {
        self.step_count = 0;
        self.step_times.clear();
        self.history.clear();
        self.total_calories = 0.0;
    }
}
