//! SnapshotSink trait - transport output interface

use crate::{ContractError, TelemetryFrame};

/// Telemetry output trait
///
/// Every transport implements this. Sinks that push to remote listeners
/// must do nothing when no listener is present.
#[trait_variant::make(SnapshotSink: Send)]
pub trait LocalSnapshotSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Publish one telemetry frame
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
