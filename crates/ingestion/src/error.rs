//! Ingestion 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 录制文件无法读取
    #[error("failed to read recording {path}: {source}")]
    Io {
        /// 文件路径
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 样本解析失败
    #[error("failed to parse sample at line {line} of '{source_name}': {message}")]
    ParseFailed {
        /// 数据源名称
        source_name: String,
        /// 行号 (1-based)
        line: usize,
        /// 错误消息
        message: String,
    },

    /// 录制文件为空
    #[error("recording for '{source_name}' contains no samples")]
    EmptyRecording {
        /// 数据源名称
        source_name: String,
    },

    /// 配置缺失
    #[error("source '{source_name}' is missing '{field}'")]
    MissingField {
        source_name: String,
        field: &'static str,
    },
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;

impl From<IngestionError> for contracts::ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::ParseFailed {
                source_name,
                line,
                message,
            } => contracts::ContractError::SampleParse {
                source_name,
                record: line,
                message,
            },
            other => contracts::ContractError::Other(other.to_string()),
        }
    }
}
