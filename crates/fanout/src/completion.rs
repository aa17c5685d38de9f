//! CompletionCoordinator - resolves a run exactly once
//!
//! Fed with one [`SinkEvent`] per sink. The first failure resolves the run as
//! failed; once every sink completed, the outputs are validated and the run
//! resolves with the [`AggregateResult`]. Events after resolution are ignored.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{Accumulator, AggregateResult, ContractError};
use tracing::{debug, trace, warn};

use crate::handle::SinkEvent;

/// Outcome of a run
pub type RunOutcome = Result<AggregateResult, ContractError>;

#[derive(Debug)]
pub struct CompletionCoordinator {
    /// Every sink of the run
    sinks: BTreeSet<String>,
    /// Completed sinks and their retained output
    completed: BTreeMap<String, Accumulator>,
    /// Bytes each completed sink reported consuming
    bytes_consumed: BTreeMap<String, u64>,
    /// Single-use resolution gate
    resolved: bool,
}

impl CompletionCoordinator {
    pub fn new<I, S>(sinks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sinks: sinks.into_iter().map(Into::into).collect(),
            completed: BTreeMap::new(),
            bytes_consumed: BTreeMap::new(),
            resolved: false,
        }
    }

    /// Feed one worker event.
    ///
    /// Returns `Some` exactly once, when this event resolves the run.
    pub fn handle(&mut self, event: SinkEvent) -> Option<RunOutcome> {
        match event {
            SinkEvent::Completed {
                sink,
                output,
                bytes_consumed,
            } => self.complete(sink, output, bytes_consumed),
            SinkEvent::Failed { sink, error } => self.fail(&sink, error),
        }
    }

    /// Record a completed sink
    pub fn complete(
        &mut self,
        sink: String,
        output: Accumulator,
        bytes_consumed: u64,
    ) -> Option<RunOutcome> {
        if self.resolved {
            trace!(sink = %sink, "Run already resolved, completion ignored");
            return None;
        }
        if !self.sinks.contains(&sink) {
            warn!(sink = %sink, "Completion from unknown sink ignored");
            return None;
        }

        debug!(sink = %sink, output_bytes = output.len(), bytes_consumed, "Sink completed");
        self.bytes_consumed.insert(sink.clone(), bytes_consumed);
        self.completed.insert(sink, output);

        if self.completed.len() < self.sinks.len() {
            return None;
        }
        self.resolved = true;
        Some(self.collect())
    }

    /// Record a fatal sink failure. The first one resolves the run.
    pub fn fail(&mut self, sink: &str, error: ContractError) -> Option<RunOutcome> {
        if self.resolved {
            trace!(sink = %sink, error = %error, "Run already resolved, failure ignored");
            return None;
        }
        self.resolved = true;
        warn!(sink = %sink, error = %error, "Run failed");
        observability::record_sink_failed(sink, error.kind());
        Some(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Sinks that have not completed yet
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.sinks
            .iter()
            .filter(|sink| !self.completed.contains_key(*sink))
            .map(String::as_str)
    }

    /// Bytes consumed by each completed sink
    pub fn bytes_consumed(&self) -> &BTreeMap<String, u64> {
        &self.bytes_consumed
    }

    fn collect(&mut self) -> RunOutcome {
        let mut outputs = Vec::with_capacity(self.completed.len());
        for (sink, output) in &self.completed {
            match output.result(sink) {
                Ok(bytes) => outputs.push((sink.clone(), bytes)),
                Err(error) => {
                    warn!(sink = %sink, error = %error, "Sink result rejected");
                    observability::record_sink_failed(sink, error.kind());
                    return Err(error);
                }
            }
        }

        for (sink, bytes) in &outputs {
            observability::record_sink_completed(sink, bytes.len());
        }
        self.completed.clear();
        Ok(outputs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::CompletionSignal;

    fn output(data: &'static [u8]) -> Accumulator {
        let mut acc = Accumulator::new();
        acc.push(Bytes::from_static(data));
        acc.mark_complete(CompletionSignal::End);
        acc
    }

    fn completed(sink: &str, data: &'static [u8]) -> SinkEvent {
        SinkEvent::Completed {
            sink: sink.to_string(),
            output: output(data),
            bytes_consumed: data.len() as u64,
        }
    }

    #[test]
    fn test_resolves_after_all_sinks() {
        let mut coordinator = CompletionCoordinator::new(["copy", "frame"]);
        assert!(coordinator.handle(completed("frame", b"jpeg")).is_none());
        assert_eq!(coordinator.pending().collect::<Vec<_>>(), vec!["copy"]);

        let result = coordinator
            .handle(completed("copy", b"original"))
            .unwrap()
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("copy").unwrap().as_ref(), b"original");
        assert_eq!(result.get("frame").unwrap().as_ref(), b"jpeg");
        assert!(coordinator.is_resolved());
        assert_eq!(coordinator.bytes_consumed().get("copy"), Some(&8));
    }

    #[test]
    fn test_first_failure_wins() {
        let mut coordinator = CompletionCoordinator::new(["a", "b"]);
        let first = coordinator
            .fail("a", ContractError::broken_pipe("a"))
            .unwrap();
        assert!(matches!(first, Err(ContractError::BrokenPipe { .. })));

        assert!(coordinator
            .fail("b", ContractError::empty_result("b"))
            .is_none());
        assert!(coordinator.handle(completed("b", b"late")).is_none());
    }

    #[test]
    fn test_resolution_fires_once() {
        let mut coordinator = CompletionCoordinator::new(["only"]);
        assert!(coordinator.handle(completed("only", b"x")).is_some());
        assert!(coordinator.handle(completed("only", b"x")).is_none());
        assert!(coordinator
            .handle(SinkEvent::Failed {
                sink: "only".to_string(),
                error: ContractError::Other("late".to_string()),
            })
            .is_none());
    }

    #[test]
    fn test_empty_output_fails_run() {
        let mut coordinator = CompletionCoordinator::new(["full", "empty"]);
        let mut empty = Accumulator::new();
        empty.mark_complete(CompletionSignal::Finish);

        assert!(coordinator.handle(completed("full", b"data")).is_none());
        let outcome = coordinator
            .handle(SinkEvent::Completed {
                sink: "empty".to_string(),
                output: empty,
                bytes_consumed: 0,
            })
            .unwrap();
        match outcome {
            Err(ContractError::EmptyResult { sink_name }) => assert_eq!(sink_name, "empty"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_sink_ignored() {
        let mut coordinator = CompletionCoordinator::new(["known"]);
        assert!(coordinator.handle(completed("stranger", b"x")).is_none());
        assert!(!coordinator.is_resolved());
    }
}
