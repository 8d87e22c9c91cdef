//! FileSink - appends snapshot records to a JSON-lines session file

use chrono::Local;
use contracts::{ContractError, SnapshotSink, TelemetryFrame};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument};

use crate::codec;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Target file, or a directory to create a timestamped session file in
    pub path: PathBuf,
    /// Truncate an existing file instead of appending
    pub truncate: bool,
}

impl FileSinkConfig {
    /// Params: `path` (required), `truncate` (bool, default false)
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        let truncate = match params.get("truncate").map(String::as_str) {
            None => false,
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("invalid 'truncate' value '{raw}'"))?,
        };

        Ok(Self { path, truncate })
    }
}

/// Resolve the file a session writes to.
///
/// Directories (existing, or given with a trailing separator) get a
/// `session_<local time>.jsonl` file.
pub fn session_file_path(path: &Path) -> PathBuf {
    let as_dir = path.is_dir() || path.to_string_lossy().ends_with(std::path::MAIN_SEPARATOR);
    if as_dir {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        path.join(format!("session_{stamp}.jsonl"))
    } else {
        path.to_path_buf()
    }
}

/// Sink that writes one JSON record per line
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records: u64,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        let path = session_file_path(&config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!config.truncate)
            .truncate(config.truncate)
            .open(&path)?;

        let name = name.into();
        info!(sink = %name, path = %path.display(), "FileSink opened");

        Ok(Self {
            name,
            path,
            writer: Some(BufWriter::new(file)),
            records: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks.{name}.params"), e))?;
        Self::new(name.clone(), config)
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    /// Resolved output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    fn append(&mut self, record: &[u8]) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("file sink closed"))?;
        writer.write_all(record)?;
        writer.flush()
    }

    fn persist(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError> {
        let record = codec::encode_for_sink(&self.name, frame)?;
        self.append(&record).map_err(|e| {
            error!(sink = %self.name, seq = frame.seq, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })?;
        self.records += 1;
        Ok(())
    }
}

impl SnapshotSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError> {
        self.persist(frame)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.writer = None;
        debug!(sink = %self.name, records = self.records, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireRecord;
    use contracts::MetricsSnapshot;
    use tempfile::tempdir;

    fn frame(seq: u64, steps: u32) -> TelemetryFrame {
        let metrics = MetricsSnapshot {
            step_count: steps,
            ..MetricsSnapshot::default()
        };
        TelemetryFrame::from_metrics(seq, 500 * seq as u32, metrics)
    }

    #[tokio::test]
    async fn test_file_sink_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("steps.jsonl");
        let config = FileSinkConfig {
            path: path.clone(),
            truncate: false,
        };

        let mut sink = FileSink::new("test_file", config).unwrap();
        sink.write(&frame(1, 2)).await.unwrap();
        sink.write(&frame(2, 4)).await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(sink.records_written(), 2);

        let text = fs::read_to_string(&path).unwrap();
        let steps: Vec<u32> = text
            .lines()
            .map(|l| serde_json::from_str::<WireRecord>(l).unwrap().steps)
            .collect();
        assert_eq!(steps, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_file_sink_appends_across_sessions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("steps.jsonl");

        for steps in [1, 2] {
            let config = FileSinkConfig {
                path: path.clone(),
                truncate: false,
            };
            let mut sink = FileSink::new("append", config).unwrap();
            sink.write(&frame(1, steps)).await.unwrap();
            sink.close().await.unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_file_sink_directory_gets_session_file() {
        let dir = tempdir().unwrap();
        let mut params = HashMap::new();
        params.insert("path".to_string(), dir.path().display().to_string());

        let mut sink = FileSink::from_params("session", &params).unwrap();
        let file_name = sink.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("session_"));
        assert!(file_name.ends_with(".jsonl"));

        sink.write(&frame(1, 1)).await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&frame(2, 2)).await.is_err());
    }

    #[test]
    fn test_file_sink_config_requires_path() {
        let params = HashMap::new();
        assert!(FileSinkConfig::from_params(&params).is_err());

        let mut params = HashMap::new();
        params.insert("path".to_string(), "a.jsonl".to_string());
        params.insert("truncate".to_string(), "yes".to_string());
        assert!(FileSinkConfig::from_params(&params).is_err());
    }
}
