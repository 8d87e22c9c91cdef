//! # Step Engine
//!
//! 步伐检测与运动指标引擎。
//!
//! 负责：
//! - 加速度模长提取
//! - 两种检测器：自适应阈值 (basic) 与 过零/峰值/频率 三重门 (advanced)
//! - 速度、距离、步频、卡路里、活动类型推导
//!
//! Every detector method is a non-blocking state transition; nothing here
//! returns an error or panics on degenerate input.
//!
//! ## 使用示例
//!
//! ```ignore
//! use step_engine::{StepEngine, DetectorKind, StepConfig};
//!
//! let mut engine = StepEngine::new(DetectorKind::Advanced, StepConfig::default());
//!
//! // Once per sampling tick
//! if engine.process(&sample, now_ms) {
//!     // step accepted
//! }
//!
//! // On the coarser snapshot tick
//! let snapshot = engine.snapshot();
//! ```

pub mod advanced;
pub mod basic;
mod engine;
mod magnitude;
pub mod projector;
mod window;

pub use advanced::{AdvancedStepDetector, Gate};
pub use basic::BasicStepDetector;
pub use engine::{create_detector, EngineStats, StepEngine};
pub use magnitude::{magnitude, sample_magnitude};
pub use window::SampleWindow;

// Re-export contracts types
pub use contracts::{
    ActivityClass, DetectorKind, MetricsSnapshot, MotionSample, StepConfig, StepDetector, TickMs,
};
