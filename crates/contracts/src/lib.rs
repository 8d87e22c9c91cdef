//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - A wrapping millisecond tick counter ([`TickMs`]) is the only clock
//! - Durations are always computed with [`ticks_diff`]

mod blueprint;
mod detector;
mod error;
mod sample;
mod sample_source;
mod sink;
mod telemetry;

pub use blueprint::*;
pub use detector::*;
pub use error::*;
pub use sample::*;
pub use sample_source::{SampleCallback, SampleSource};
pub use sink::*;
pub use telemetry::*;
