//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the fan-out engine.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data model
//! - A [`Chunk`] is an immutable, reference-counted byte sequence. Handing the same
//!   chunk to several sinks shares one allocation.
//! - A sink implements [`ChunkSink`] and keeps its bytes in an [`Accumulator`].
//! - A successful run yields an [`AggregateResult`] keyed by sink name.

mod accumulator;
mod config;
mod error;
mod result;
mod sink;

pub use accumulator::{Accumulator, CompletionSignal};
pub use config::*;
pub use error::*;
pub use result::AggregateResult;
pub use sink::*;

/// One ordered piece of the source stream.
pub type Chunk = bytes::Bytes;
