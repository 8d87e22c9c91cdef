//! SampleSource trait - sensor driver boundary
//!
//! Decouples the sampling loop from where readings come from (hardware,
//! synthetic gait, recorded session).

use std::sync::Arc;

use crate::SamplePacket;

/// Sample callback type
///
/// The source calls it once per reading. Dropping the last clone signals
/// that the source is exhausted.
pub type SampleCallback = Arc<dyn Fn(SamplePacket) + Send + Sync>;

/// Sensor sample source
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn SampleSource> = build_source(&blueprint.source)?;
/// source.listen(Arc::new(|packet| {
///     println!("accel z = {}", packet.sample.accel.z);
/// }));
/// source.stop();
/// ```
pub trait SampleSource: Send + Sync {
    /// Source name (logging/metrics label)
    fn name(&self) -> &str;

    /// Start producing samples into `callback`.
    ///
    /// Idempotent: a second call while listening is ignored.
    fn listen(&self, callback: SampleCallback);

    /// Stop producing samples
    fn stop(&self);

    /// Whether the source is currently producing
    fn is_listening(&self) -> bool;
}
