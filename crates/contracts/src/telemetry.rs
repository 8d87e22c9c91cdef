//! TelemetryFrame - sampling loop output
//!
//! What the dispatcher receives on every snapshot tick.

use serde::{Deserialize, Serialize};

use crate::{MetricsSnapshot, TickMs, Vec3};

/// Snapshot of the engine plus the latest raw readings.
///
/// Built by value in the sampling loop; sinks only ever see copies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Monotonic frame sequence number
    pub seq: u64,

    /// Tick at which the snapshot was taken
    pub timestamp_ms: TickMs,

    /// Engine metrics
    pub metrics: MetricsSnapshot,

    /// Last temperature reading (°C)
    pub temp_c: Option<f32>,

    /// Latest acceleration (g)
    pub accel: Option<Vec3>,

    /// Latest angular rate (deg/s)
    pub gyro: Option<Vec3>,
}

impl TelemetryFrame {
    /// Metrics-only frame
    pub fn from_metrics(seq: u64, timestamp_ms: TickMs, metrics: MetricsSnapshot) -> Self {
        Self {
            seq,
            timestamp_ms,
            metrics,
            temp_c: None,
            accel: None,
            gyro: None,
        }
    }
}

/// Command sent back from a connected listener to the sampling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Start a new session: zero the detector's counters
    Reset,
}

impl ControlCommand {
    /// Parse a text command, ignoring surrounding whitespace and case
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "reset" => Some(ControlCommand::Reset),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_command_parse() {
        assert_eq!(ControlCommand::parse("reset"), Some(ControlCommand::Reset));
        assert_eq!(ControlCommand::parse("  RESET\n"), Some(ControlCommand::Reset));
        assert_eq!(ControlCommand::parse("bye"), None);
        assert_eq!(ControlCommand::parse(""), None);
    }
}
