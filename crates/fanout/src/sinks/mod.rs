//! Sink implementations
//!
//! Contains AccumulatingSink and ProcessSink.

mod accumulating;
mod process;

pub use self::accumulating::AccumulatingSink;
pub use self::process::ProcessSink;
