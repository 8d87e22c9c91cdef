//! Sink implementations
//!
//! Log, JSON-lines file, TCP broadcast and chunked radio notify.

mod file;
mod log;
mod network;
mod radio;

pub use self::file::{session_file_path, FileSink, FileSinkConfig};
pub use self::log::{LogLevel, LogSink};
pub use self::network::{NetworkSink, NetworkSinkConfig};
pub use self::radio::{RadioSink, RadioSinkConfig, MAX_CHUNK_SIZE};
