//! Accumulator - ordered chunk buffer shared by every sink variant
//!
//! Retains chunks without copying them and concatenates once on request.

use bytes::{Bytes, BytesMut};

use crate::{Chunk, ContractError};

/// The two notifications that both mean "this accumulation is finished".
///
/// Whichever arrives first completes the accumulator; the other is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// Writer side finished flushing
    Finish,
    /// Reader side reached end of stream
    End,
}

/// Growing ordered list of chunks plus a running length counter
#[derive(Debug, Default)]
pub struct Accumulator {
    chunks: Vec<Chunk>,
    len: usize,
    completed_by: Option<CompletionSignal>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are not retained.
    pub fn push(&mut self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Total retained bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of retained chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Mark complete. Returns `true` only for the first signal.
    pub fn mark_complete(&mut self, signal: CompletionSignal) -> bool {
        if self.completed_by.is_some() {
            return false;
        }
        self.completed_by = Some(signal);
        true
    }

    pub fn is_complete(&self) -> bool {
        self.completed_by.is_some()
    }

    /// Which signal completed this accumulator, if any
    pub fn completed_by(&self) -> Option<CompletionSignal> {
        self.completed_by
    }

    /// Concatenate the retained chunks into one contiguous byte sequence.
    ///
    /// # Errors
    /// - [`ContractError::SinkIncomplete`] before completion
    /// - [`ContractError::EmptyResult`] when no bytes were retained
    pub fn result(&self, sink_name: &str) -> Result<Bytes, ContractError> {
        if !self.is_complete() {
            return Err(ContractError::sink_incomplete(sink_name));
        }
        match self.chunks.as_slice() {
            [] => Err(ContractError::empty_result(sink_name)),
            [single] => Ok(single.clone()),
            chunks => {
                let mut out = BytesMut::with_capacity(self.len);
                for chunk in chunks {
                    out.extend_from_slice(chunk);
                }
                Ok(out.freeze())
            }
        }
    }
}
