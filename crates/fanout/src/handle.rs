//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;

use contracts::{Accumulator, Chunk, ChunkSink, ContractError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::metrics::SinkMetrics;

/// Terminal report of one sink worker. Exactly one is sent per worker.
#[derive(Debug)]
pub enum SinkEvent {
    /// The sink consumed all input and completed
    Completed {
        sink: String,
        output: Accumulator,
        bytes_consumed: u64,
    },
    /// The sink failed fatally
    Failed { sink: String, error: ContractError },
}

impl SinkEvent {
    pub fn sink(&self) -> &str {
        match self {
            Self::Completed { sink, .. } | Self::Failed { sink, .. } => sink,
        }
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Sending side of the queue, taken by the Distributor
    input: Option<SinkInput>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: Option<JoinHandle<()>>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// The worker reports its outcome on `events`.
    pub fn spawn<S: ChunkSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        events: mpsc::UnboundedSender<SinkEvent>,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, events, worker_name).await;
        });

        Self {
            input: Some(SinkInput {
                name: name.clone(),
                tx,
                metrics: Arc::clone(&metrics),
            }),
            name,
            metrics,
            worker_handle: Some(worker_handle),
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Take the sending side of the queue. Only the first call returns `Some`.
    pub fn take_input(&mut self) -> Option<SinkInput> {
        self.input.take()
    }

    /// Whether the worker task has ended
    pub fn is_finished(&self) -> bool {
        self.worker_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Abort the worker and wait until it is gone.
    ///
    /// Dropping the worker drops its sink, which kills a still running process.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(&mut self) {
        drop(self.input.take());
        if let Some(worker) = self.worker_handle.take() {
            worker.abort();
            match worker.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => trace!(sink = %self.name, "Worker aborted"),
                Err(e) => error!(sink = %self.name, error = ?e, "Worker task panicked"),
            }
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker_handle.take() {
            worker.abort();
        }
    }
}

/// Sending side of one sink queue
pub struct SinkInput {
    name: String,
    tx: mpsc::Sender<Chunk>,
    metrics: Arc<SinkMetrics>,
}

impl SinkInput {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a chunk, waiting while the queue is full.
    ///
    /// Returns false if the worker is gone.
    pub async fn send(&self, chunk: Chunk) -> bool {
        if self.tx.send(chunk).await.is_err() {
            trace!(sink = %self.name, "Sink worker closed, chunk not queued");
            return false;
        }
        let depth = self.tx.max_capacity() - self.tx.capacity();
        self.metrics.set_queue_len(depth);
        observability::record_queue_depth(&self.name, depth);
        true
    }
}

/// Worker task that feeds queued chunks to the sink and reports the outcome
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics, events),
    fields(sink = %name)
)]
async fn sink_worker<S: ChunkSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Chunk>,
    metrics: Arc<SinkMetrics>,
    events: mpsc::UnboundedSender<SinkEvent>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    let event = match drive(&mut sink, &mut rx, &metrics).await {
        Ok(()) => {
            debug!(sink = %name, bytes = sink.bytes_consumed(), "Sink worker completed");
            SinkEvent::Completed {
                sink: name.clone(),
                output: sink.take_output(),
                bytes_consumed: sink.bytes_consumed(),
            }
        }
        Err(error) => {
            metrics.inc_failure_count();
            warn!(sink = %name, error = %error, "Sink failed");
            SinkEvent::Failed {
                sink: name.clone(),
                error,
            }
        }
    };

    if events.send(event).is_err() {
        trace!(sink = %name, "Coordinator gone, event discarded");
    }
}

async fn drive<S: ChunkSink>(
    sink: &mut S,
    rx: &mut mpsc::Receiver<Chunk>,
    metrics: &SinkMetrics,
) -> Result<(), ContractError> {
    loop {
        let next = {
            let fault = sink.fault();
            tokio::select! {
                biased;
                error = fault => return Err(error),
                chunk = rx.recv() => chunk,
            }
        };

        let Some(chunk) = next else {
            break;
        };
        metrics.set_queue_len(rx.len());
        metrics.record_chunk(chunk.len());
        sink.consume(chunk).await?;
    }

    sink.finish().await
}
