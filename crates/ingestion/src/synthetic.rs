//! 合成步态数据源
//!
//! Generates a heel-strike shaped acceleration signal at a fixed cadence,
//! for running the pipeline without hardware.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use contracts::{MotionSample, SampleCallback, SamplePacket, SampleSource, TickMs, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// 合成步态配置
#[derive(Debug, Clone)]
pub struct SyntheticGaitConfig {
    /// 采样周期 (ms)
    pub period_ms: u32,

    /// 步频 (steps/s)，0 表示静止
    pub cadence_hz: f32,

    /// 脚跟着地峰值 (g, 去除重力后)
    pub amplitude_g: f32,

    /// 均匀噪声幅度 (g)
    pub noise_g: f32,

    /// 生成时长 (ms)，None 表示直到 stop()
    pub duration_ms: Option<u64>,

    /// 噪声随机种子
    pub seed: u64,

    /// true: 按采样周期 sleep；false: 尽快输出
    pub realtime: bool,

    /// 第一个样本的 tick
    pub start_tick: TickMs,

    /// 环境温度 (°C)
    pub temp_c: f32,
}

impl Default for SyntheticGaitConfig {
    fn default() -> Self {
        Self {
            period_ms: 50,
            cadence_hz: 1.8,
            amplitude_g: 0.6,
            noise_g: 0.0,
            duration_ms: None,
            seed: 0,
            realtime: true,
            start_tick: 0,
            temp_c: 24.0,
        }
    }
}

impl SyntheticGaitConfig {
    /// Number of samples to emit, `None` for unbounded
    pub fn sample_limit(&self) -> Option<u64> {
        self.duration_ms
            .map(|d| d / u64::from(self.period_ms.max(1)))
    }
}

/// Gravity-free acceleration over one stride, `phase` in `[0, 1)`.
///
/// A sharp positive heel strike followed by a broader negative rebound,
/// so the signal crosses zero downward exactly once per stride.
pub fn gait_waveform(phase: f32, amplitude_g: f32) -> f32 {
    let strike = (-((phase - 0.15) / 0.08).powi(2)).exp();
    let rebound = (-((phase - 0.45) / 0.12).powi(2)).exp();
    amplitude_g * (strike - 0.45 * rebound)
}

/// Build the `index`-th sample of a synthetic session.
pub fn synthetic_sample(config: &SyntheticGaitConfig, index: u64, rng: &mut StdRng) -> SamplePacket {
    let elapsed_ms = index * u64::from(config.period_ms);
    let t = elapsed_ms as f32 / 1000.0;
    let phase = (t * config.cadence_hz).fract();

    let noise = if config.noise_g > 0.0 {
        rng.random_range(-config.noise_g..=config.noise_g)
    } else {
        0.0
    };
    let vertical = 1.0 + gait_waveform(phase, config.amplitude_g) + noise;

    // Arm swing shows up on the gyro at the stride rate
    let swing = (TAU * phase).sin();
    let gyro = Vec3::new(30.0 * swing, 5.0 * swing, 2.0);

    SamplePacket {
        timestamp_ms: config.start_tick.wrapping_add(elapsed_ms as TickMs),
        seq: index,
        sample: MotionSample {
            accel: Vec3::new(0.0, 0.0, vertical),
            gyro: Some(gyro),
            temp_c: Some(config.temp_c + 0.002 * t),
        },
    }
}

/// 合成步态数据源
///
/// Runs a background thread that calls the callback once per sample.
pub struct SyntheticGaitSource {
    name: String,
    config: SyntheticGaitConfig,
    listening: Arc<AtomicBool>,
}

impl SyntheticGaitSource {
    pub fn new(name: impl Into<String>, config: SyntheticGaitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SyntheticGaitConfig {
        &self.config
    }
}

impl SampleSource for SyntheticGaitSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: SampleCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = self.name.clone();
        let config = self.config.clone();
        let listening = self.listening.clone();

        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let limit = config.sample_limit();
            let period = Duration::from_millis(u64::from(config.period_ms));
            let start = Instant::now();
            let mut index: u64 = 0;

            debug!(
                source = %name,
                cadence_hz = config.cadence_hz,
                amplitude_g = config.amplitude_g,
                "synthetic gait source started"
            );

            while listening.load(Ordering::Relaxed) {
                if limit.is_some_and(|limit| index >= limit) {
                    break;
                }

                let packet = synthetic_sample(&config, index, &mut rng);
                callback(packet);
                trace!(source = %name, seq = index, "synthetic sample sent");
                index += 1;

                if config.realtime {
                    // Pace against the start instant so sleep jitter doesn't accumulate
                    let target = period * index as u32;
                    let elapsed = start.elapsed();
                    if target > elapsed {
                        thread::sleep(target - elapsed);
                    }
                }
            }

            listening.store(false, Ordering::SeqCst);
            debug!(source = %name, samples = index, "synthetic gait source stopped");
        });
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}
