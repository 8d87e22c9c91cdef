//! DeviceBlueprint - Config Loader 输出
//!
//! 描述完整的设备配置：设备名、检测器、采样节奏、数据源、输出路由。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::{DetectorKind, StepConfig, DEFAULT_STEP_LENGTH_M, DEFAULT_USER_WEIGHT_KG};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的设备配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DeviceBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 设备标识
    #[serde(default)]
    #[validate(nested)]
    pub device: DeviceConfig,

    /// 步伐检测器
    #[serde(default)]
    #[validate(nested)]
    pub detector: DetectorConfig,

    /// 采样节奏
    #[serde(default)]
    #[validate(nested)]
    pub sampling: SamplingConfig,

    /// 数据源
    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,

    /// 输出路由配置
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

/// 设备配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeviceConfig {
    /// 广播名称 (listeners see this)
    #[serde(default = "default_device_name")]
    #[validate(length(min = 1, max = 29))]
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

fn default_device_name() -> String {
    "PicoW-Steps".to_string()
}

/// 检测器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DetectorConfig {
    /// 检测算法
    #[serde(default)]
    pub kind: DetectorKind,

    /// 步长 (m)
    #[serde(default = "default_step_length")]
    #[validate(range(exclusive_min = 0.0, max = 3.0))]
    pub step_length_m: f32,

    /// 体重 (kg)，仅 advanced 用于卡路里
    #[serde(default = "default_user_weight")]
    #[validate(range(exclusive_min = 0.0, max = 500.0))]
    pub user_weight_kg: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::default(),
            step_length_m: DEFAULT_STEP_LENGTH_M,
            user_weight_kg: DEFAULT_USER_WEIGHT_KG,
        }
    }
}

fn default_step_length() -> f32 {
    DEFAULT_STEP_LENGTH_M
}

fn default_user_weight() -> f32 {
    DEFAULT_USER_WEIGHT_KG
}

/// 采样节奏配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SamplingConfig {
    /// 采样周期 (ms)
    #[serde(default = "default_period_ms")]
    #[validate(range(min = 1))]
    pub period_ms: u32,

    /// 快照发送间隔 (ms)，必须 >= period_ms
    #[serde(default = "default_snapshot_interval_ms")]
    #[validate(range(min = 1))]
    pub snapshot_interval_ms: u32,

    /// 每 N 个样本刷新一次温度
    #[serde(default = "default_temperature_every")]
    #[validate(range(min = 1))]
    pub temperature_every: u32,

    /// 每 N 个快照打印一次状态日志
    #[serde(default = "default_status_every")]
    #[validate(range(min = 1))]
    pub status_every: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            temperature_every: default_temperature_every(),
            status_every: default_status_every(),
        }
    }
}

fn default_period_ms() -> u32 {
    50
}

fn default_snapshot_interval_ms() -> u32 {
    500
}

fn default_temperature_every() -> u32 {
    100 // 100 × 50ms = 5s
}

fn default_status_every() -> u32 {
    20 // 20 × 500ms = 10s
}

/// 数据源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// 合成步态信号
    #[default]
    Synthetic,
    /// 回放录制的 JSONL 会话
    Replay,
}

/// 数据源配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    // ----- synthetic -----
    /// 步频 (Hz)
    #[serde(default = "default_cadence_hz")]
    #[validate(range(exclusive_min = 0.0, max = 5.0))]
    pub cadence_hz: f32,

    /// 加速度摆幅 (g)
    #[serde(default = "default_amplitude_g")]
    #[validate(range(min = 0.0, max = 8.0))]
    pub amplitude_g: f32,

    /// 噪声幅度 (g)
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0))]
    pub noise_g: f32,

    /// 生成时长 (ms)，None 表示无限
    #[serde(default)]
    pub duration_ms: Option<u64>,

    /// 噪声随机种子
    #[serde(default)]
    pub seed: u64,

    /// 是否按真实时间节奏输出
    #[serde(default = "default_true")]
    pub realtime: bool,

    // ----- replay -----
    /// 录制文件路径
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// 回放速度倍率 (1.0 = 原速)
    #[serde(default = "default_speed_multiplier")]
    #[validate(range(exclusive_min = 0.0))]
    pub speed_multiplier: f64,

    /// 是否循环回放
    #[serde(default)]
    pub loop_playback: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            cadence_hz: default_cadence_hz(),
            amplitude_g: default_amplitude_g(),
            noise_g: 0.0,
            duration_ms: None,
            seed: 0,
            realtime: true,
            path: None,
            speed_multiplier: default_speed_multiplier(),
            loop_playback: false,
        }
    }
}

fn default_cadence_hz() -> f32 {
    1.8
}

fn default_amplitude_g() -> f32 {
    0.6
}

fn default_speed_multiplier() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink 名称
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    16
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出 (JSON lines)
    File,
    /// 局域网广播 (TCP, 每个已连接客户端)
    Network,
    /// 短距无线通知 (分片, UDP 模拟)
    Radio,
}

impl SinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkType::Log => "log",
            SinkType::File => "file",
            SinkType::Network => "network",
            SinkType::Radio => "radio",
        }
    }
}

impl DeviceBlueprint {
    /// Detector construction parameters
    pub fn to_step_config(&self) -> StepConfig {
        StepConfig {
            step_length_m: self.detector.step_length_m,
            user_weight_kg: self.detector.user_weight_kg,
        }
    }

    /// Sampling period
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.sampling.period_ms))
    }

    /// Snapshot send interval
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.sampling.snapshot_interval_ms))
    }
}
