//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::DetectorKind;
use std::path::PathBuf;

/// Pedometer - step detection and gait metrics for a wrist/hip IMU
#[derive(Parser, Debug)]
#[command(
    name = "pedometer",
    author,
    version,
    about = "Wearable step-detection and gait metrics engine",
    long_about = "Reads accelerometer samples from a synthetic gait generator or a recorded\n\
                  session, detects steps, derives speed, distance, cadence, calories and\n\
                  activity, and publishes periodic snapshots to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "PEDOMETER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "PEDOMETER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sampling loop
    Run(RunArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Show detector constants and configured sinks
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "PEDOMETER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the detector variant
    #[arg(long, value_enum, env = "PEDOMETER_DETECTOR")]
    pub detector: Option<DetectorArg>,

    /// Replay a recorded JSONL session instead of the configured source
    #[arg(long, env = "PEDOMETER_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = original pace)
    #[arg(long, requires = "replay")]
    pub replay_speed: Option<f64>,

    /// Loop the replay when it reaches the end
    #[arg(long, requires = "replay")]
    pub replay_loop: bool,

    /// Stop after this many seconds (0 = until Ctrl-C or source end)
    #[arg(long, default_value = "0", env = "PEDOMETER_DURATION")]
    pub duration: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size for sample and snapshot queues
    #[arg(long, default_value = "64", env = "PEDOMETER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "PEDOMETER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Configuration file to validate
    #[arg(short, long, default_value = "pedometer.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(value: LogFormat) -> Self {
        match value {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

/// Detector selection on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorArg {
    Basic,
    Advanced,
}

impl From<DetectorArg> for DetectorKind {
    fn from(value: DetectorArg) -> Self {
        match value {
            DetectorArg::Basic => DetectorKind::Basic,
            DetectorArg::Advanced => DetectorKind::Advanced,
        }
    }
}

/// Default log level for the verbosity flags
pub fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
