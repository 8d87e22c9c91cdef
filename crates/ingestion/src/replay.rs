//! Replay Source - 从录制文件回放传感器数据
//!
//! 读取 JSONL 录制文件（每行一个 `SamplePacket`），按原始时间戳回放。

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{ticks_diff, SampleCallback, SamplePacket, SampleSource};
use tracing::{debug, info, warn};

use crate::error::{IngestionError, Result};

/// Gap inserted between loops when the recording has a single sample (ms)
const DEFAULT_LOOP_GAP_MS: i32 = 50;

/// Replay 配置
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// 回放速度倍率 (1.0 = 原速)
    pub speed_multiplier: f64,

    /// 是否循环回放
    pub loop_playback: bool,

    /// false: 不等待，尽快输出
    pub realtime: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            loop_playback: false,
            realtime: true,
        }
    }
}

/// Read every sample of a JSONL recording.
///
/// Blank lines and `#` comments are skipped.
pub fn read_recording(path: &Path, source_name: &str) -> Result<Vec<SamplePacket>> {
    let file = File::open(path).map_err(|source| IngestionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut packets = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| IngestionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let packet: SamplePacket =
            serde_json::from_str(trimmed).map_err(|e| IngestionError::ParseFailed {
                source_name: source_name.to_string(),
                line: idx + 1,
                message: e.to_string(),
            })?;
        packets.push(packet);
    }

    if packets.is_empty() {
        return Err(IngestionError::EmptyRecording {
            source_name: source_name.to_string(),
        });
    }
    Ok(packets)
}

/// Write samples as a JSONL recording
pub fn write_recording<W: Write>(mut writer: W, packets: &[SamplePacket]) -> std::io::Result<()> {
    for packet in packets {
        serde_json::to_writer(&mut writer, packet)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Replay Source - 从录制文件回放样本
pub struct ReplaySource {
    name: String,
    path: PathBuf,
    packets: Arc<Vec<SamplePacket>>,
    config: ReplayConfig,
    listening: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplaySource {
    /// 从录制文件加载
    pub fn load(path: &Path, name: impl Into<String>, config: ReplayConfig) -> Result<Self> {
        let name = name.into();
        let packets = read_recording(path, &name)?;

        info!(
            source = %name,
            path = %path.display(),
            samples = packets.len(),
            "loaded recording"
        );

        Ok(Self::from_packets(name, path.to_path_buf(), packets, config))
    }

    /// Wrap samples already in memory
    pub fn from_packets(
        name: impl Into<String>,
        path: PathBuf,
        packets: Vec<SamplePacket>,
        config: ReplayConfig,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            packets: Arc::new(packets),
            config,
            listening: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Span of one pass plus the gap before the next one starts (ms)
fn loop_stride(packets: &[SamplePacket]) -> i32 {
    match packets {
        [first, second, .., last] => {
            ticks_diff(last.timestamp_ms, first.timestamp_ms)
                + ticks_diff(second.timestamp_ms, first.timestamp_ms).max(1)
        }
        [first, last] => 2 * ticks_diff(last.timestamp_ms, first.timestamp_ms).max(1),
        _ => DEFAULT_LOOP_GAP_MS,
    }
}

impl SampleSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: SampleCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = self.name.clone();
        let packets = self.packets.clone();
        let listening = self.listening.clone();
        let speed = self.config.speed_multiplier.max(0.01);
        let loop_playback = self.config.loop_playback;
        let realtime = self.config.realtime;

        let handle = thread::spawn(move || {
            debug!(source = %name, "replay thread started");

            let Some(first) = packets.first() else {
                warn!(source = %name, "no samples to replay");
                listening.store(false, Ordering::SeqCst);
                return;
            };
            let first_tick = first.timestamp_ms;
            let stride = loop_stride(&packets);
            let mut pass: u32 = 0;
            let mut seq: u64 = 0;

            'replay: loop {
                let start_time = Instant::now();
                let offset = (stride as u32).wrapping_mul(pass);

                for packet in packets.iter() {
                    if !listening.load(Ordering::Relaxed) {
                        debug!(source = %name, "replay stopped");
                        break 'replay;
                    }

                    let rel_ms = ticks_diff(packet.timestamp_ms, first_tick).max(0);
                    if realtime {
                        let target = Duration::from_secs_f64(f64::from(rel_ms) / 1000.0 / speed);
                        let elapsed = start_time.elapsed();
                        if target > elapsed {
                            thread::sleep(target - elapsed);
                        }
                    }

                    let mut out = *packet;
                    out.timestamp_ms = packet.timestamp_ms.wrapping_add(offset);
                    out.seq = seq;
                    seq += 1;
                    callback(out);
                }

                if !loop_playback {
                    info!(source = %name, samples = seq, "replay completed");
                    break;
                }

                pass = pass.wrapping_add(1);
                debug!(source = %name, pass, "looping replay");
            }

            listening.store(false, Ordering::SeqCst);
        });

        if let Ok(mut slot) = self.thread_handle.lock() {
            *slot = Some(handle);
        }
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);

        let handle = self.thread_handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MotionSample, TickMs};
    use std::io::Write as _;

    fn packet(timestamp_ms: TickMs, z: f32) -> SamplePacket {
        SamplePacket {
            timestamp_ms,
            seq: 0,
            sample: MotionSample::from_accel(0.0, 0.0, z),
        }
    }

    fn collect(source: &ReplaySource) -> Vec<SamplePacket> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        source.listen(Arc::new(move |p| sink.lock().unwrap().push(p)));
        for _ in 0..200 {
            if !source.is_listening() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let out = received.lock().unwrap().clone();
        out
    }

    #[test]
    fn test_read_recording_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# recorded on the bench").unwrap();
        writeln!(file, r#"{{"timestamp_ms":0,"accel":{{"x":0.0,"y":0.0,"z":1.0}}}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"timestamp_ms":50,"accel":{{"x":0.0,"y":0.0,"z":1.2}},"temp_c":25.5}}"#
        )
        .unwrap();

        let packets = read_recording(file.path(), "bench").unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].timestamp_ms, 50);
        assert_eq!(packets[1].sample.temp_c, Some(25.5));
    }

    #[test]
    fn test_read_recording_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"timestamp_ms":0,"accel":{{"x":0.0,"y":0.0,"z":1.0}}}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let err = read_recording(file.path(), "bench").unwrap_err();
        match err {
            IngestionError::ParseFailed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_recording_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            read_recording(file.path(), "empty"),
            Err(IngestionError::EmptyRecording { .. })
        ));
    }

    #[test]
    fn test_write_then_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let packets = vec![packet(0, 1.0), packet(50, 1.5), packet(100, 0.8)];
        write_recording(file.as_file(), &packets).unwrap();

        let source = ReplaySource::load(file.path(), "rec", ReplayConfig::default()).unwrap();
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_replay_in_order() {
        let source = ReplaySource::from_packets(
            "rec",
            PathBuf::new(),
            vec![packet(100, 1.0), packet(150, 1.5), packet(200, 0.8)],
            ReplayConfig {
                realtime: false,
                ..Default::default()
            },
        );

        let out = collect(&source);
        assert_eq!(
            out.iter().map(|p| p.timestamp_ms).collect::<Vec<_>>(),
            vec![100, 150, 200]
        );
        assert_eq!(out.iter().map(|p| p.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_loop_keeps_time_moving_forward() {
        let source = ReplaySource::from_packets(
            "rec",
            PathBuf::new(),
            vec![packet(0, 1.0), packet(50, 1.5), packet(100, 0.8)],
            ReplayConfig {
                realtime: false,
                loop_playback: true,
                ..Default::default()
            },
        );

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        source.listen(Arc::new(move |p: SamplePacket| {
            let mut guard = sink.lock().unwrap();
            if guard.len() < 7 {
                guard.push(p.timestamp_ms);
            }
        }));
        while received.lock().unwrap().len() < 7 {
            thread::sleep(Duration::from_millis(1));
        }
        source.stop();

        let times = received.lock().unwrap().clone();
        assert_eq!(times, vec![0, 50, 100, 150, 200, 250, 300]);
    }

    #[test]
    fn test_loop_stride() {
        assert_eq!(loop_stride(&[packet(0, 1.0)]), DEFAULT_LOOP_GAP_MS);
        assert_eq!(loop_stride(&[packet(0, 1.0), packet(40, 1.0)]), 80);
        assert_eq!(
            loop_stride(&[packet(0, 1.0), packet(50, 1.0), packet(100, 1.0)]),
            150
        );
    }
}
