//! Metrics projector.
//!
//! Stateless derivations from a detector's step-time history. Every
//! function here returns a neutral value (`0.0` / `None`) instead of
//! dividing by zero.

use contracts::{ticks_diff, TickMs};

/// Number of most recent step timestamps used for rate estimates
pub const RECENT_STEPS: usize = 5;

/// Cadence above which strides are assumed longer (steps/s)
pub const FAST_CADENCE_HZ: f32 = 2.5;

/// Cadence below which strides are assumed shorter (steps/s)
pub const SLOW_CADENCE_HZ: f32 = 1.5;

const FAST_STRIDE_FACTOR: f32 = 1.15;
const SLOW_STRIDE_FACTOR: f32 = 0.95;

const MS_PER_HOUR: f64 = 1000.0 * 3600.0;

/// The newest `RECENT_STEPS` step times (or all of them if fewer).
#[inline]
pub fn recent_steps(step_times: &[TickMs]) -> &[TickMs] {
    let start = step_times.len().saturating_sub(RECENT_STEPS);
    &step_times[start..]
}

/// Interval count and span (ms) of the recent step window.
///
/// `None` with fewer than two steps or a non-positive span.
pub fn recent_span(step_times: &[TickMs]) -> Option<(usize, i32)> {
    let recent = recent_steps(step_times);
    let (first, last) = match recent {
        [first, .., last] => (*first, *last),
        _ => return None,
    };

    let span_ms = ticks_diff(last, first);
    if span_ms <= 0 {
        return None;
    }
    Some((recent.len() - 1, span_ms))
}

/// Step rate over the recent window (steps/s)
pub fn step_rate_hz(step_times: &[TickMs]) -> Option<f32> {
    recent_span(step_times).map(|(intervals, span_ms)| intervals as f32 / (span_ms as f32 / 1000.0))
}

/// Uncorrected speed: recent step rate × step length (m/s)
pub fn base_speed(step_times: &[TickMs], step_length_m: f32) -> f32 {
    step_rate_hz(step_times).map_or(0.0, |rate| rate * step_length_m)
}

/// Stride-length correction factor for a given cadence (steps/s)
pub fn stride_factor(rate_hz: f32) -> f32 {
    if rate_hz > FAST_CADENCE_HZ {
        FAST_STRIDE_FACTOR
    } else if rate_hz < SLOW_CADENCE_HZ {
        SLOW_STRIDE_FACTOR
    } else {
        1.0
    }
}

/// Speed with cadence-dependent stride correction (m/s)
pub fn corrected_speed(step_times: &[TickMs], step_length_m: f32) -> f32 {
    step_rate_hz(step_times).map_or(0.0, |rate| rate * step_length_m * stride_factor(rate))
}

/// Cadence over the recent window (steps/min)
pub fn cadence_spm(step_times: &[TickMs]) -> f32 {
    step_rate_hz(step_times).map_or(0.0, |rate| rate * 60.0)
}

/// Metabolic equivalent for a speed given in km/h.
///
/// Bands: `<3.2` → 2.0, `<4.8` → 3.5, `<6.4` → 5.0, else 8.0.
pub fn met_for_speed_kmh(speed_kmh: f32) -> f64 {
    if speed_kmh < 3.2 {
        2.0
    } else if speed_kmh < 4.8 {
        3.5
    } else if speed_kmh < 6.4 {
        5.0
    } else {
        8.0
    }
}

/// Energy spent at `met` for `elapsed_ms` by a body of `weight_kg` (kcal).
///
/// Non-positive durations contribute nothing.
pub fn calorie_increment(met: f64, weight_kg: f32, elapsed_ms: i32) -> f64 {
    if elapsed_ms <= 0 {
        return 0.0;
    }
    met * f64::from(weight_kg) * (f64::from(elapsed_ms) / MS_PER_HOUR)
}
