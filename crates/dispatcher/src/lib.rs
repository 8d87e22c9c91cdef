//! # Dispatcher
//!
//! 快照分发模块。
//!
//! 负责：
//! - 消费采样循环产出的 `TelemetryFrame`
//! - 编码为换行分隔的 JSON 记录
//! - Fan-out 到多个 sinks，慢 sink 只丢自己的帧，不阻塞采样

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use codec::{encode_record, RecordAssembler, WireRecord};
pub use contracts::{ControlCommand, SnapshotSink, TelemetryFrame};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{SinkMetrics, SinkStats};
pub use sinks::{FileSink, LogSink, NetworkSink, RadioSink};
