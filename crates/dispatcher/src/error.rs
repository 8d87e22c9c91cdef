//! Dispatcher error types

use contracts::{ContractError, SinkConfig};
use thiserror::Error;

/// Raised while building sinks. Once running, sink failures are only counted.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("failed to create {sink_type} sink '{name}': {source}")]
    SinkCreation {
        name: String,
        sink_type: &'static str,
        #[source]
        source: ContractError,
    },
}

impl DispatcherError {
    pub fn sink_creation(config: &SinkConfig, source: ContractError) -> Self {
        Self::SinkCreation {
            name: config.name.clone(),
            sink_type: config.sink_type.as_str(),
            source,
        }
    }

    /// Name of the sink that failed
    pub fn sink_name(&self) -> &str {
        match self {
            Self::SinkCreation { name, .. } => name,
        }
    }
}
