//! StepDetector - step engine interface
//!
//! The capability every detector variant exposes to the sampling loop,
//! plus the value types it hands out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TickMs;

/// Default step length (m)
pub const DEFAULT_STEP_LENGTH_M: f32 = 0.7;

/// Default user weight (kg)
pub const DEFAULT_USER_WEIGHT_KG: f32 = 70.0;

/// Construction-time detector configuration.
///
/// Immutable once a detector is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Assumed length of one step (m), must be > 0
    pub step_length_m: f32,

    /// User body weight (kg), used by calorie accounting only
    pub user_weight_kg: f32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            step_length_m: DEFAULT_STEP_LENGTH_M,
            user_weight_kg: DEFAULT_USER_WEIGHT_KG,
        }
    }
}

impl StepConfig {
    pub fn with_step_length(step_length_m: f32) -> Self {
        Self {
            step_length_m,
            ..Default::default()
        }
    }
}

/// Detector variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Adaptive-threshold edge detector
    Basic,
    /// Zero-crossing / peak / frequency detector with calorie accounting
    #[default]
    Advanced,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Basic => "basic",
            DetectorKind::Advanced => "advanced",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity class derived from current speed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActivityClass {
    #[default]
    Immobile,
    SlowWalk,
    Walk,
    FastWalk,
    Run,
}

impl ActivityClass {
    /// Classify a speed given in km/h.
    ///
    /// Bands: `<0.5` immobile, `<3.2` slow walk, `<4.8` walk, `<6.4` fast walk, else run.
    pub fn from_speed_kmh(speed_kmh: f32) -> Self {
        if speed_kmh < 0.5 {
            ActivityClass::Immobile
        } else if speed_kmh < 3.2 {
            ActivityClass::SlowWalk
        } else if speed_kmh < 4.8 {
            ActivityClass::Walk
        } else if speed_kmh < 6.4 {
            ActivityClass::FastWalk
        } else {
            ActivityClass::Run
        }
    }

    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityClass::Immobile => "immobile",
            ActivityClass::SlowWalk => "slow_walk",
            ActivityClass::Walk => "walk",
            ActivityClass::FastWalk => "fast_walk",
            ActivityClass::Run => "run",
        }
    }
}

impl fmt::Display for ActivityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time metrics read from a detector.
///
/// Plain value: copied out to transports, never a view into detector state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub step_count: u32,
    pub speed_mps: f32,
    pub distance_m: f32,
    pub cadence_spm: f32,
    pub calories: f64,
    pub activity: ActivityClass,
}

/// Step detection capability.
///
/// Implementations are single-owner state machines: `update` is called once
/// per sampling tick with the acceleration magnitude, all accessors are
/// side-effect free and never fail (degenerate inputs yield `0.0`).
pub trait StepDetector: Send {
    /// Which variant this is
    fn kind(&self) -> DetectorKind;

    /// Feed one magnitude reading (g) taken at `now_ms`.
    ///
    /// Returns `true` iff a step was accepted on this call.
    fn update(&mut self, magnitude: f32, now_ms: TickMs) -> bool;

    /// Accepted steps since construction or last reset
    fn step_count(&self) -> u32;

    /// Tick of every accepted step, oldest first
    fn step_times(&self) -> &[TickMs];

    /// Current speed estimate (m/s)
    fn speed(&self) -> f32;

    /// Distance covered (m)
    fn distance(&self) -> f32;

    /// Current cadence (steps/min)
    fn cadence(&self) -> f32;

    /// Energy spent (kcal)
    fn calories(&self) -> f64;

    /// Activity class for the current speed
    fn activity(&self) -> ActivityClass {
        ActivityClass::from_speed_kmh(self.speed() * 3.6)
    }

    /// Clear counters and histories, keeping configuration.
    fn reset(&mut self);

    /// Copy out every metric at once
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            step_count: self.step_count(),
            speed_mps: self.speed(),
            distance_m: self.distance(),
            cadence_spm: self.cadence(),
            calories: self.calories(),
            activity: self.activity(),
        }
    }
}
