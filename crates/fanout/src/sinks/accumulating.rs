//! AccumulatingSink - keeps every chunk it receives

use bytes::Bytes;
use contracts::{Accumulator, Chunk, ChunkSink, CompletionSignal, ContractError};
use tracing::{debug, instrument};

/// Sink whose result is the concatenation of its input
pub struct AccumulatingSink {
    name: String,
    buffer: Accumulator,
    bytes_consumed: u64,
}

impl AccumulatingSink {
    /// Create a new AccumulatingSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: Accumulator::new(),
            bytes_consumed: 0,
        }
    }

    /// Bytes retained so far. Never blocks.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Deliver one of the completion notifications.
    ///
    /// Returns `true` if this notification completed the sink.
    pub fn signal(&mut self, signal: CompletionSignal) -> bool {
        let first = self.buffer.mark_complete(signal);
        if first {
            debug!(sink = %self.name, ?signal, bytes = self.buffer.len(), "AccumulatingSink complete");
        }
        first
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.is_complete()
    }

    /// Concatenated output
    ///
    /// # Errors
    /// Fails before completion or when nothing was received.
    pub fn result(&self) -> Result<Bytes, ContractError> {
        self.buffer.result(&self.name)
    }
}

impl ChunkSink for AccumulatingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn consume(&mut self, chunk: Chunk) -> Result<(), ContractError> {
        self.bytes_consumed += chunk.len() as u64;
        self.buffer.push(chunk);
        Ok(())
    }

    #[instrument(name = "accumulating_sink_finish", skip(self), fields(sink = %self.name))]
    async fn finish(&mut self) -> Result<(), ContractError> {
        self.signal(CompletionSignal::Finish);
        Ok(())
    }

    async fn fault(&self) -> ContractError {
        std::future::pending().await
    }

    fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    fn take_output(&mut self) -> Accumulator {
        std::mem::take(&mut self.buffer)
    }
}
