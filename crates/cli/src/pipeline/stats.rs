//! Pipeline statistics and metrics.

use std::fmt;
use std::time::Duration;

use contracts::DetectorKind;
use dispatcher::SinkStats;
use observability::{RunningStats, SessionAggregator, StatsSummary};

/// Why the sampling loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl-C or SIGTERM
    Signal,
    /// `--duration` elapsed
    Duration,
    /// Source closed its channel
    SourceExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Signal => "signal",
            StopReason::Duration => "duration",
            StopReason::SourceExhausted => "source exhausted",
        })
    }
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub detector: DetectorKind,
    pub source: String,

    /// Samples the source produced
    pub samples_received: u64,

    /// Samples dropped by ingestion backpressure
    pub samples_dropped: u64,

    /// Samples fed to the step engine
    pub samples_processed: u64,

    /// Non-finite readings skipped by the loop
    pub source_faults: u64,

    /// Non-finite readings the engine itself turned down
    pub rejected_samples: u64,

    /// Steps accepted during the run (not reset by `reset` commands)
    pub steps_detected: u64,

    /// Frames handed to the dispatcher
    pub snapshots_sent: u64,

    /// Frames lost because the dispatcher queue was full or closed
    pub snapshots_dropped: u64,

    pub control_commands: u64,

    /// Number of sinks that received data
    pub active_sinks: usize,

    /// Per-sink counters after drain
    pub sink_stats: Vec<(String, SinkStats)>,

    /// Per-sample processing time (ms)
    pub loop_latency: RunningStats,

    /// Per-snapshot session aggregate
    pub session: SessionAggregator,

    pub stop_reason: Option<StopReason>,

    /// Total duration of the pipeline run
    pub duration: Duration,
}

impl PipelineStats {
    /// Sample throughput
    pub fn samples_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.samples_processed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Ingestion drop rate as percentage
    pub fn drop_rate(&self) -> f64 {
        if self.samples_received > 0 {
            (self.samples_dropped as f64 / self.samples_received as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn sink_errors(&self) -> u64 {
        self.sink_stats.iter().map(|(_, s)| s.failure_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        print!("{}", self);
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║                    Pipeline Statistics                       ║")?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝\n")?;

        writeln!(f, "📊 Overview")?;
        writeln!(f, "   ├─ Duration: {:.2}s", self.duration.as_secs_f64())?;
        if let Some(reason) = self.stop_reason {
            writeln!(f, "   ├─ Stopped by: {}", reason)?;
        }
        writeln!(f, "   ├─ Detector: {}", self.detector)?;
        writeln!(f, "   ├─ Source: {}", self.source)?;
        writeln!(
            f,
            "   ├─ Samples: {} received, {} processed ({:.2}/s)",
            self.samples_received,
            self.samples_processed,
            self.samples_per_sec()
        )?;
        writeln!(
            f,
            "   ├─ Dropped samples: {} ({:.2}%)",
            self.samples_dropped,
            self.drop_rate()
        )?;
        writeln!(
            f,
            "   ├─ Faults: {} skipped, {} rejected",
            self.source_faults, self.rejected_samples
        )?;
        writeln!(f, "   ├─ Steps detected: {}", self.steps_detected)?;
        writeln!(
            f,
            "   ├─ Snapshots: {} sent, {} dropped",
            self.snapshots_sent, self.snapshots_dropped
        )?;
        if self.control_commands > 0 {
            writeln!(f, "   ├─ Control commands: {}", self.control_commands)?;
        }
        writeln!(
            f,
            "   └─ Loop latency (ms): {}",
            StatsSummary::from(&self.loop_latency)
        )?;

        if !self.sink_stats.is_empty() {
            writeln!(f, "\n📤 Sinks ({} active)", self.active_sinks)?;
            let last = self.sink_stats.len() - 1;
            for (i, (name, stats)) in self.sink_stats.iter().enumerate() {
                let glyph = if i == last { "└─" } else { "├─" };
                writeln!(
                    f,
                    "   {} {}: {} written, {} failed, {} dropped",
                    glyph, name, stats.write_count, stats.failure_count, stats.dropped_count
                )?;
            }
        }

        let summary = self.session.summary();
        writeln!(f, "\n🚶 Session")?;
        writeln!(f, "   ├─ Steps: {}", summary.total_steps)?;
        if summary.resets_observed > 0 {
            writeln!(f, "   ├─ Resets: {}", summary.resets_observed)?;
        }
        writeln!(f, "   ├─ Distance: {:.2} m", summary.total_distance_m)?;
        writeln!(f, "   ├─ Calories: {:.1} kcal", summary.total_calories)?;
        writeln!(f, "   ├─ Speed (m/s): {}", summary.speed_mps)?;
        writeln!(f, "   ├─ Cadence (spm): {}", summary.cadence_spm)?;
        writeln!(f, "   ├─ Temperature (°C): {}", summary.temperature_c)?;
        match summary.dominant_activity() {
            Some(activity) => writeln!(f, "   └─ Dominant activity: {}", activity)?,
            None => writeln!(f, "   └─ Dominant activity: N/A")?,
        }

        writeln!(f)
    }
}
