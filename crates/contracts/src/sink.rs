//! ChunkSink trait - Distributor output interface
//!
//! Defines the abstract interface for sinks.

use crate::{Accumulator, Chunk, ContractError};

/// Consumer of the duplicated byte stream
///
/// All sink implementations must implement this trait.
#[trait_variant::make(ChunkSink: Send)]
pub trait LocalChunkSink {
    /// Sink name, unique within a run (used for results/logging/metrics)
    fn name(&self) -> &str;

    /// Consume the next chunk of the source stream
    ///
    /// May suspend while the downstream cannot accept more data.
    ///
    /// # Errors
    /// Returns a fatal error for this sink. Tolerated conditions are absorbed.
    async fn consume(&mut self, chunk: Chunk) -> Result<(), ContractError>;

    /// Signal end of input and wait until the sink has completed
    async fn finish(&mut self) -> Result<(), ContractError>;

    /// Resolves when the sink fails on its own, independent of its input.
    ///
    /// Sinks that cannot fail this way never resolve.
    async fn fault(&self) -> ContractError;

    /// Bytes received through [`consume`](LocalChunkSink::consume) so far
    fn bytes_consumed(&self) -> u64;

    /// Hand over the retained output, leaving an empty accumulator behind
    fn take_output(&mut self) -> Accumulator;
}
