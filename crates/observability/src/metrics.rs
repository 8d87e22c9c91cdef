//! 计步会话指标
//!
//! `record_*` 函数写入 `metrics` facade；`SessionAggregator` 在内存中
//! 聚合一次运行的统计，用于退出时打印摘要。

use std::collections::BTreeMap;

use contracts::{ActivityClass, ControlCommand, MetricsSnapshot, TelemetryFrame};
use metrics::{counter, gauge, histogram};

/// 记录一次快照的瞬时指标
pub fn record_snapshot_metrics(snapshot: &MetricsSnapshot) {
    gauge!("pedometer_speed_mps").set(snapshot.speed_mps as f64);
    gauge!("pedometer_cadence_spm").set(snapshot.cadence_spm as f64);
    gauge!("pedometer_step_count").set(snapshot.step_count as f64);
}

/// 记录传感器读数故障 (非有限值)
pub fn record_source_fault(source: &str) {
    counter!("pedometer_source_faults_total", "source" => source.to_string()).increment(1);
}

/// 记录采样循环单次处理耗时
pub fn record_loop_latency_ms(latency_ms: f64) {
    histogram!("pedometer_loop_latency_ms").record(latency_ms);
}

/// 记录来自监听端的控制命令
pub fn record_control_command(command: ControlCommand) {
    let name = match command {
        ControlCommand::Reset => "reset",
    };
    counter!("pedometer_control_commands_total", "command" => name).increment(1);
}

/// 会话统计聚合器
///
/// 步数在 reset 后会归零；聚合器检测到计数回落时把上一段的步数累加进
/// `steps_before_reset`，因此 `total_steps` 跨越 reset 仍然单调。
#[derive(Debug, Clone, Default)]
pub struct SessionAggregator {
    snapshots: u64,
    last_steps: u32,
    steps_before_reset: u64,
    resets_observed: u64,
    max_distance_m: f64,
    distance_before_reset: f64,
    last_calories: f64,
    calories_before_reset: f64,
    speed: RunningStats,
    cadence: RunningStats,
    temperature: RunningStats,
    activity: BTreeMap<ActivityClass, u64>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, frame: &TelemetryFrame) {
        let m = &frame.metrics;
        self.snapshots += 1;

        if m.step_count < self.last_steps {
            self.resets_observed += 1;
            self.steps_before_reset += self.last_steps as u64;
            self.distance_before_reset += self.max_distance_m;
            self.calories_before_reset += self.last_calories;
            self.max_distance_m = 0.0;
        }
        self.last_steps = m.step_count;
        self.last_calories = m.calories;
        self.max_distance_m = self.max_distance_m.max(m.distance_m as f64);

        // 静止阶段的 0 值会拉低均值，只统计移动中的快照
        if m.activity != ActivityClass::Immobile {
            self.speed.push(m.speed_mps as f64);
            self.cadence.push(m.cadence_spm as f64);
        }
        if let Some(t) = frame.temp_c {
            self.temperature.push(t as f64);
        }
        *self.activity.entry(m.activity).or_insert(0) += 1;
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    /// 跨 reset 的总步数
    pub fn total_steps(&self) -> u64 {
        self.steps_before_reset + self.last_steps as u64
    }

    /// 生成摘要报告
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            snapshots: self.snapshots,
            total_steps: self.total_steps(),
            resets_observed: self.resets_observed,
            total_distance_m: self.distance_before_reset + self.max_distance_m,
            total_calories: self.calories_before_reset + self.last_calories,
            speed_mps: StatsSummary::from(&self.speed),
            cadence_spm: StatsSummary::from(&self.cadence),
            temperature_c: StatsSummary::from(&self.temperature),
            activity_counts: self.activity.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 会话摘要
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub snapshots: u64,
    pub total_steps: u64,
    pub resets_observed: u64,
    pub total_distance_m: f64,
    pub total_calories: f64,
    pub speed_mps: StatsSummary,
    pub cadence_spm: StatsSummary,
    pub temperature_c: StatsSummary,
    pub activity_counts: BTreeMap<ActivityClass, u64>,
}

impl SessionSummary {
    /// 出现次数最多的活动类别 (并列时取速度更高者)
    pub fn dominant_activity(&self) -> Option<ActivityClass> {
        self.activity_counts
            .iter()
            .max_by_key(|(_, n)| **n)
            .map(|(a, _)| *a)
    }
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Summary ===")?;
        writeln!(f, "Snapshots: {}", self.snapshots)?;
        writeln!(f, "Steps: {}", self.total_steps)?;
        if self.resets_observed > 0 {
            writeln!(f, "Resets: {}", self.resets_observed)?;
        }
        writeln!(f, "Distance: {:.2} m", self.total_distance_m)?;
        writeln!(f, "Calories: {:.1} kcal", self.total_calories)?;
        writeln!(f, "Speed (m/s): {}", self.speed_mps)?;
        writeln!(f, "Cadence (spm): {}", self.cadence_spm)?;
        writeln!(f, "Temperature (°C): {}", self.temperature_c)?;

        if !self.activity_counts.is_empty() {
            writeln!(f, "Activity:")?;
            for (activity, count) in &self.activity_counts {
                let pct = *count as f64 / self.snapshots.max(1) as f64 * 100.0;
                writeln!(f, "  {}: {} ({:.1}%)", activity, count, pct)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.2}, max={:.2}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
