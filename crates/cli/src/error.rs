//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatcherError;
use ingestion::IngestionError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parsing or validation error
    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    /// Sample source could not be built
    #[error("Failed to open sample source: {0}")]
    Source(#[from] IngestionError),

    /// Sink setup failed
    #[error("Failed to start dispatcher: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
