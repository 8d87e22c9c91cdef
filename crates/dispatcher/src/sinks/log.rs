//! LogSink - logs each snapshot via tracing

use contracts::{ContractError, SnapshotSink, TelemetryFrame};
use std::collections::HashMap;
use tracing::{debug, info, instrument, trace, warn};

/// Level the snapshot line is emitted at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            _ => None,
        }
    }
}

macro_rules! log_snapshot {
    ($mac:ident, $name:ident, $f:ident) => {
        $mac!(
            sink = %$name,
            seq = $f.seq,
            steps = $f.metrics.step_count,
            speed_mps = $f.metrics.speed_mps,
            distance_m = $f.metrics.distance_m,
            cadence_spm = $f.metrics.cadence_spm,
            calories = $f.metrics.calories,
            activity = %$f.metrics.activity,
            temp_c = ?$f.temp_c,
            "Snapshot"
        )
    };
}

/// Sink that logs snapshot summaries
pub struct LogSink {
    name: String,
    level: LogLevel,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_level(name, LogLevel::default())
    }

    pub fn with_level(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// Params: `level` (trace|debug|info|warn, default info)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let level = match params.get("level") {
            Some(raw) => LogLevel::parse(raw).ok_or_else(|| {
                ContractError::config_validation(
                    format!("sinks.{name}.params.level"),
                    format!("unknown log level '{raw}'"),
                )
            })?,
            None => LogLevel::default(),
        };
        Ok(Self::with_level(name, level))
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn log_snapshot(&self, frame: &TelemetryFrame) {
        let name = &self.name;
        match self.level {
            LogLevel::Trace => log_snapshot!(trace, name, frame),
            LogLevel::Debug => log_snapshot!(debug, name, frame),
            LogLevel::Info => log_snapshot!(info, name, frame),
            LogLevel::Warn => log_snapshot!(warn, name, frame),
        }
    }
}

impl SnapshotSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError> {
        self.log_snapshot(frame);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MetricsSnapshot;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        let frame = TelemetryFrame::from_metrics(1, 500, MetricsSnapshot::default());
        assert!(sink.write(&frame).await.is_ok());
    }

    #[test]
    fn test_log_sink_level_param() {
        let mut params = HashMap::new();
        params.insert("level".to_string(), "DEBUG".to_string());
        let sink = LogSink::from_params("console", &params).unwrap();
        assert_eq!(sink.name(), "console");
        assert_eq!(sink.level(), LogLevel::Debug);

        params.insert("level".to_string(), "loud".to_string());
        assert!(matches!(
            LogSink::from_params("console", &params),
            Err(ContractError::ConfigValidation { .. })
        ));
    }
}
