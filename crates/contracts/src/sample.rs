//! MotionSample - sensor driver output
//!
//! One accelerometer/gyroscope reading per sampling tick, plus the
//! millisecond tick counter used as the engine's only clock.

use serde::{Deserialize, Serialize};

/// Millisecond tick counter.
///
/// Wraps at `u32::MAX`; never subtract two ticks directly, use [`ticks_diff`].
pub type TickMs = u32;

/// Signed difference `end - start` between two tick readings.
///
/// Correct across a single wrap of the counter as long as the real
/// interval is shorter than `i32::MAX` milliseconds.
#[inline]
pub fn ticks_diff(end: TickMs, start: TickMs) -> i32 {
    end.wrapping_sub(start) as i32
}

/// 3-axis vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm `sqrt(x² + y² + z²)`
    #[inline]
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Single sensor reading.
///
/// Acceleration is in g, gyro in deg/s, temperature in °C. Only `accel`
/// feeds step detection; the rest is carried through to the wire record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub accel: Vec3,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro: Option<Vec3>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f32>,
}

impl MotionSample {
    /// Acceleration-only sample
    pub fn from_accel(x: f32, y: f32, z: f32) -> Self {
        Self {
            accel: Vec3::new(x, y, z),
            gyro: None,
            temp_c: None,
        }
    }
}

/// Timestamped sample as it travels from a source to the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePacket {
    /// Tick at which the sample was read
    pub timestamp_ms: TickMs,

    /// Sequence number assigned by the source (for ordering/diagnostics)
    #[serde(default)]
    pub seq: u64,

    #[serde(flatten)]
    pub sample: MotionSample,
}
