//! Wire codec - newline-delimited JSON snapshot records
//!
//! Every transport publishes the same record. Floats are rounded before
//! serialisation so listeners never see `0.30000001`-style noise.

use contracts::{ActivityClass, ContractError, TelemetryFrame, Vec3};
use serde::{Deserialize, Serialize};

/// Record delimiter
pub const RECORD_DELIMITER: u8 = b'\n';

/// Default notification payload size for chunked transports
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Rounded 3-axis reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireVec {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vec3> for WireVec {
    fn from(v: Vec3) -> Self {
        Self {
            x: round_to(v.x as f64, 2),
            y: round_to(v.y as f64, 2),
            z: round_to(v.z as f64, 2),
        }
    }
}

/// One snapshot as it goes over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub steps: u32,
    /// m/s, 2 dp
    pub speed: f64,
    /// metres, 2 dp
    pub distance: f64,
    /// kcal, 1 dp
    pub calories: f64,
    /// steps/min, 1 dp
    pub cadence: f64,
    pub activity: ActivityClass,
    /// °C, 1 dp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel: Option<WireVec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro: Option<WireVec>,
}

impl From<&TelemetryFrame> for WireRecord {
    fn from(frame: &TelemetryFrame) -> Self {
        let m = &frame.metrics;
        Self {
            steps: m.step_count,
            speed: round_to(m.speed_mps as f64, 2),
            distance: round_to(m.distance_m as f64, 2),
            calories: round_to(m.calories, 1),
            cadence: round_to(m.cadence_spm as f64, 1),
            activity: m.activity,
            temp: frame.temp_c.map(|t| round_to(t as f64, 1)),
            accel: frame.accel.map(WireVec::from),
            gyro: frame.gyro.map(WireVec::from),
        }
    }
}

/// Round half away from zero to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Serialise a frame into a delimited record
pub fn encode_record(frame: &TelemetryFrame) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = serde_json::to_vec(&WireRecord::from(frame))?;
    buf.push(RECORD_DELIMITER);
    Ok(buf)
}

/// Same as [`encode_record`], reported as a sink write error
pub fn encode_for_sink(sink_name: &str, frame: &TelemetryFrame) -> Result<Vec<u8>, ContractError> {
    encode_record(frame).map_err(|e| ContractError::sink_write(sink_name, e.to_string()))
}

/// Split an encoded record into notification-sized chunks.
///
/// A `chunk_size` of zero is treated as one.
pub fn chunk_record(record: &[u8], chunk_size: usize) -> std::slice::Chunks<'_, u8> {
    record.chunks(chunk_size.max(1))
}

/// Listener-side reassembly of chunked records.
///
/// Bytes are buffered until a delimiter arrives; each complete line is
/// decoded into a [`WireRecord`].
#[derive(Debug, Default)]
pub struct RecordAssembler {
    buf: Vec<u8>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes, returning every record they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<WireRecord, serde_json::Error>> {
        self.buf.extend_from_slice(bytes);

        let mut records = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == RECORD_DELIMITER) {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let body = &line[..line.len() - 1];
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            records.push(serde_json::from_slice(body));
        }
        records
    }

    /// Bytes waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MetricsSnapshot;

    fn frame() -> TelemetryFrame {
        TelemetryFrame {
            seq: 3,
            timestamp_ms: 1500,
            metrics: MetricsSnapshot {
                step_count: 12,
                speed_mps: 1.23456,
                distance_m: 8.4049,
                cadence_spm: 107.14,
                calories: 0.4632,
                activity: ActivityClass::Walk,
            },
            temp_c: Some(24.56),
            accel: Some(Vec3::new(0.012, -0.004, 1.2349)),
            gyro: None,
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.46, 1), 0.5);
        assert_eq!(round_to(-2.25, 1), -2.3);
        assert_eq!(round_to(f64::NAN, 2), 0.0);
    }

    #[test]
    fn test_wire_record_rounding() {
        let rec = WireRecord::from(&frame());
        assert_eq!(rec.steps, 12);
        assert_eq!(rec.speed, 1.23);
        assert_eq!(rec.distance, 8.4);
        assert_eq!(rec.calories, 0.5);
        assert_eq!(rec.cadence, 107.1);
        assert_eq!(rec.temp, Some(24.6));
        assert_eq!(rec.accel.map(|a| a.z), Some(1.23));
        assert!(rec.gyro.is_none());
    }

    #[test]
    fn test_encode_record_layout() {
        let bytes = encode_record(&frame()).unwrap();
        assert_eq!(bytes.last(), Some(&RECORD_DELIMITER));

        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with(r#"{"steps":12,"speed":1.23,"distance":8.4,"#));
        assert!(text.contains(r#""activity":"walk""#));
        assert!(!text.contains("gyro"));
        assert_eq!(text.matches('\n').count(), 1);
    }

    #[test]
    fn test_chunks_reassemble() {
        let bytes = encode_record(&frame()).unwrap();
        let chunks: Vec<&[u8]> = chunk_record(&bytes, DEFAULT_CHUNK_SIZE).collect();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= DEFAULT_CHUNK_SIZE));

        let mut asm = RecordAssembler::new();
        let mut out = Vec::new();
        for c in chunks {
            out.extend(asm.push(c));
        }
        assert_eq!(out.len(), 1);
        assert_eq!(asm.pending(), 0);
        let rec = out.pop().unwrap().unwrap();
        assert_eq!(rec, WireRecord::from(&frame()));
    }

    #[test]
    fn test_assembler_two_records_one_push() {
        let mut bytes = encode_record(&frame()).unwrap();
        bytes.extend(encode_record(&frame()).unwrap());
        bytes.extend_from_slice(b"{\"steps\"");

        let mut asm = RecordAssembler::new();
        let out = asm.push(&bytes);
        assert_eq!(out.len(), 2);
        assert_eq!(asm.pending(), 8);
    }

    #[test]
    fn test_chunk_size_zero() {
        let chunks: Vec<&[u8]> = chunk_record(b"abc", 0).collect();
        assert_eq!(chunks.len(), 3);
    }
}
