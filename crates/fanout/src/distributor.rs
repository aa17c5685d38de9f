//! Distributor - copies every source chunk to every sink queue

use std::time::Instant;

use contracts::ContractError;
use futures::future::join_all;
use observability::RunSummary;
use tracing::{debug, info, instrument, warn};

use crate::handle::SinkInput;
use crate::source::ChunkSource;

/// Drives the writes of one run
///
/// Every chunk is queued for all sinks before the next one is read, so each sink
/// sees the source order. A full queue suspends only the send to that sink.
pub struct Distributor {
    inputs: Vec<SinkInput>,
    summary: RunSummary,
}

impl Distributor {
    /// # Errors
    /// [`ContractError::Configuration`] when `inputs` is empty.
    pub fn new(inputs: Vec<SinkInput>) -> Result<Self, ContractError> {
        if inputs.is_empty() {
            return Err(ContractError::configuration("at least one sink is required"));
        }
        let mut summary = RunSummary::new();
        for input in &inputs {
            summary.sink_bytes_in.insert(input.name().to_string(), 0);
        }
        Ok(Self { inputs, summary })
    }

    /// Sinks still receiving chunks
    pub fn sink_count(&self) -> usize {
        self.inputs.len()
    }

    /// Counters of the chunks distributed so far
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Distribute the whole source.
    ///
    /// On end of input every sink queue is closed, which signals end to the sinks.
    /// On a source error the queues stay open and the error is returned; the
    /// caller tears the sinks down.
    ///
    /// # Errors
    /// [`ContractError::Source`] if the source reports a read failure.
    #[instrument(name = "distributor_run", skip_all, fields(sinks = self.inputs.len()))]
    pub async fn run(&mut self, source: &mut ChunkSource) -> Result<(), ContractError> {
        info!(sinks = self.inputs.len(), "Distributor started");
        let started = Instant::now();

        while let Some(item) = source.recv().await {
            let chunk = item.map_err(|e| {
                warn!(error = %e, chunks = self.summary.chunks, "Source failed");
                ContractError::source(e)
            })?;
            if chunk.is_empty() {
                continue;
            }

            let sent = join_all(self.inputs.iter().map(|input| input.send(chunk.clone()))).await;
            let mut sent = sent.into_iter();
            self.inputs.retain(|input| {
                let delivered = sent.next().unwrap_or(false);
                if !delivered {
                    debug!(sink = %input.name(), "Sink stopped receiving, removed from distribution");
                }
                delivered
            });

            self.summary.push_chunk(chunk.len());
            for input in &self.inputs {
                if let Some(total) = self.summary.sink_bytes_in.get_mut(input.name()) {
                    *total += chunk.len() as u64;
                }
            }
            observability::record_chunk_distributed(chunk.len(), self.inputs.len());

            if self.summary.chunks.is_multiple_of(256) {
                debug!(chunks = self.summary.chunks, bytes = self.summary.bytes, "Distributor progress");
            }
        }

        self.summary.duration = started.elapsed();
        info!(
            chunks = self.summary.chunks,
            bytes = self.summary.bytes,
            "Source ended, closing sink inputs"
        );
        self.inputs.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{SinkEvent, SinkHandle};
    use crate::sinks::AccumulatingSink;
    use bytes::Bytes;
    use std::io;
    use tokio::sync::mpsc;

    fn handles(names: &[&str]) -> (Vec<SinkHandle>, mpsc::UnboundedReceiver<SinkEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handles = names
            .iter()
            .map(|name| SinkHandle::spawn(AccumulatingSink::new(*name), 2, events_tx.clone()))
            .collect();
        (handles, events_rx)
    }

    #[test]
    fn test_zero_sinks_is_configuration_error() {
        let result = Distributor::new(Vec::new());
        assert!(matches!(result, Err(ContractError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_every_sink_gets_every_chunk() {
        let (mut handles, mut events_rx) = handles(&["a", "b"]);
        let inputs = handles.iter_mut().filter_map(SinkHandle::take_input).collect();
        let mut distributor = Distributor::new(inputs).unwrap();

        let mut source = ChunkSource::from_chunks(vec![
            Bytes::from_static(b"hello "),
            Bytes::new(),
            Bytes::from_static(b"world"),
        ]);
        distributor.run(&mut source).await.unwrap();
        assert_eq!(distributor.sink_count(), 0);

        let summary = distributor.summary();
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.bytes, 11);
        assert!(summary.mismatched_sinks().is_empty());

        for _ in 0..2 {
            match events_rx.recv().await.unwrap() {
                SinkEvent::Completed { sink, output, .. } => {
                    assert_eq!(output.result(&sink).unwrap().as_ref(), b"hello world");
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_source_error_keeps_inputs_open() {
        let (mut handles, mut events_rx) = handles(&["a"]);
        let inputs = handles.iter_mut().filter_map(SinkHandle::take_input).collect();
        let mut distributor = Distributor::new(inputs).unwrap();

        let (tx, mut source) = ChunkSource::channel(4);
        tx.send(Ok(Bytes::from_static(b"partial"))).await.unwrap();
        tx.send(Err(io::Error::other("read failed"))).await.unwrap();
        drop(tx);

        let err = distributor.run(&mut source).await.unwrap_err();
        assert!(matches!(err, ContractError::Source { .. }));
        assert_eq!(distributor.sink_count(), 1);
        // the sink never sees end of input
        assert!(events_rx.try_recv().is_err());
    }
}
