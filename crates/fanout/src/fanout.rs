//! Fanout - builds the sinks of a run and drives it to a single outcome

use std::collections::BTreeSet;
use std::time::Instant;

use contracts::{AggregateResult, ChunkSink, ContractError, FanoutConfig, ProcessSpec, SinkKind};
use observability::RunSummary;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::completion::{CompletionCoordinator, RunOutcome};
use crate::distributor::Distributor;
use crate::handle::{SinkEvent, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{AccumulatingSink, ProcessSink};
use crate::source::ChunkSource;

/// Default per-sink queue capacity, in chunks
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Builder for a [`Fanout`]
///
/// Sinks are started as soon as they are added, so a tokio runtime must be
/// running. Set the queue capacity before adding sinks.
pub struct FanoutBuilder {
    queue_capacity: usize,
    handles: Vec<SinkHandle>,
    names: BTreeSet<String>,
    events_tx: mpsc::UnboundedSender<SinkEvent>,
    events_rx: mpsc::UnboundedReceiver<SinkEvent>,
    error: Option<ContractError>,
}

impl Default for FanoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutBuilder {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handles: Vec::new(),
            names: BTreeSet::new(),
            events_tx,
            events_rx,
            error: None,
        }
    }

    /// Queue capacity for sinks added after this call
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Add any sink. A duplicate name makes [`build`](Self::build) fail.
    pub fn sink<S: ChunkSink + Send + 'static>(mut self, sink: S) -> Self {
        if self.error.is_some() {
            return self;
        }
        if !self.names.insert(sink.name().to_string()) {
            self.error = Some(duplicate_name(sink.name()));
            return self;
        }
        debug!(sink = %sink.name(), queue_capacity = self.queue_capacity, "Sink added");
        let handle = SinkHandle::spawn(sink, self.queue_capacity, self.events_tx.clone());
        self.handles.push(handle);
        self
    }

    /// Add an [`AccumulatingSink`]
    pub fn accumulating(self, name: impl Into<String>) -> Self {
        self.sink(AccumulatingSink::new(name))
    }

    /// Spawn a process and add a [`ProcessSink`] around it
    ///
    /// # Errors
    /// [`ContractError::ProcessSpawn`] if the process cannot be started.
    pub fn process(
        mut self,
        name: impl Into<String>,
        spec: &ProcessSpec,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        if self.error.is_some() {
            return Ok(self);
        }
        if self.names.contains(&name) {
            self.error = Some(duplicate_name(&name));
            return Ok(self);
        }
        let sink = ProcessSink::spawn(name, spec)?;
        Ok(self.sink(sink))
    }

    /// Builder with every sink of `config` added
    ///
    /// # Errors
    /// A process sink without a process spec, or a process that cannot be started.
    #[instrument(name = "fanout_builder_from_config", skip(config), fields(sink_count = config.sinks.len()))]
    pub fn from_config(config: &FanoutConfig) -> Result<Self, ContractError> {
        let mut builder = Self::new().queue_capacity(config.queue_capacity);
        for sink_config in &config.sinks {
            builder = match sink_config.kind {
                SinkKind::Accumulate => builder.accumulating(&sink_config.name),
                SinkKind::Process => {
                    let spec = sink_config.process.as_ref().ok_or_else(|| {
                        ContractError::config_validation(
                            format!("sinks.{}.process", sink_config.name),
                            "process sink requires a process spec",
                        )
                    })?;
                    builder.process(&sink_config.name, spec)?
                }
            };
        }
        Ok(builder)
    }

    /// Finish building
    ///
    /// # Errors
    /// The first configuration error met while adding sinks.
    pub fn build(self) -> Result<Fanout, ContractError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        info!(sinks = self.handles.len(), "Fanout built");
        Ok(Fanout {
            handles: self.handles,
            events_rx: self.events_rx,
        })
    }
}

fn duplicate_name(name: &str) -> ContractError {
    ContractError::config_validation("sinks", format!("duplicate sink name '{name}'"))
}

/// A prepared run: started sinks waiting for the source
pub struct Fanout {
    handles: Vec<SinkHandle>,
    events_rx: mpsc::UnboundedReceiver<SinkEvent>,
}

impl Fanout {
    pub fn builder() -> FanoutBuilder {
        FanoutBuilder::new()
    }

    /// Sink names in insertion order
    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(SinkHandle::name)
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run to completion
    ///
    /// # Errors
    /// The first fatal error of the run. No partial result is returned.
    pub async fn run(self, source: ChunkSource) -> Result<AggregateResult, ContractError> {
        self.run_with_summary(source).await.0
    }

    /// Run to completion and report the run counters alongside the outcome
    #[instrument(name = "fanout_run", skip_all, fields(sinks = self.handles.len()))]
    pub async fn run_with_summary(mut self, mut source: ChunkSource) -> (RunOutcome, RunSummary) {
        let started = Instant::now();

        let inputs = self
            .handles
            .iter_mut()
            .filter_map(SinkHandle::take_input)
            .collect();
        let mut distributor = match Distributor::new(inputs) {
            Ok(distributor) => distributor,
            Err(e) => {
                warn!(error = %e, "Run rejected before reading the source");
                observability::record_run_finished(false, started.elapsed());
                return (Err(e), RunSummary::new());
            }
        };
        let mut coordinator =
            CompletionCoordinator::new(self.handles.iter().map(|h| h.name().to_string()));

        let outcome = {
            let distribution = distributor.run(&mut source);
            tokio::pin!(distribution);
            let mut distributing = true;

            loop {
                tokio::select! {
                    result = &mut distribution, if distributing => {
                        distributing = false;
                        if let Err(e) = result {
                            break Err(e);
                        }
                    }
                    event = self.events_rx.recv() => match event {
                        Some(event) => {
                            if let Some(outcome) = coordinator.handle(event) {
                                break outcome;
                            }
                        }
                        None => {
                            let pending: Vec<&str> = coordinator.pending().collect();
                            break Err(ContractError::Other(format!(
                                "sink workers ended without reporting: {}",
                                pending.join(", ")
                            )));
                        }
                    },
                }
            }
        };

        self.teardown().await;
        drop(source);

        let mut summary = distributor.summary().clone();
        summary.duration = started.elapsed();
        if let Ok(result) = &outcome {
            summary.sink_bytes_in = coordinator.bytes_consumed().clone();
            for (sink, bytes) in result.iter() {
                summary.sink_bytes_out.insert(sink.to_string(), bytes.len() as u64);
            }
            let mismatched = summary.mismatched_sinks();
            if !mismatched.is_empty() {
                warn!(
                    sinks = ?mismatched,
                    distributed = summary.bytes,
                    "Sinks consumed a different byte count than was distributed"
                );
            }
        }

        match &outcome {
            Ok(result) => info!(
                sinks = result.len(),
                bytes = summary.bytes,
                elapsed_ms = summary.duration.as_millis() as u64,
                "Run succeeded"
            ),
            Err(e) => warn!(error = %e, kind = e.kind(), "Run failed"),
        }
        observability::record_run_finished(outcome.is_ok(), summary.duration);

        (outcome, summary)
    }

    /// Stop every worker. Dropping a process sink kills its process.
    async fn teardown(&mut self) {
        for handle in &mut self.handles {
            handle.shutdown().await;
        }
    }
}
