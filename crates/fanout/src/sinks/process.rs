//! ProcessSink - pipes chunks through an external process
//!
//! Input goes to the process stdin, the result is whatever it writes to stdout.
//! A broken pipe on stdin stops forwarding but is not an error.

use std::future::Future;

use bytes::Bytes;
use contracts::{Accumulator, Chunk, ChunkSink, ContractError, ProcessSpec};
use tracing::{debug, info, instrument, trace};

use crate::process::{ProcessHandle, ProcessState};

/// Sink backed by one external process
pub struct ProcessSink {
    name: String,
    process: ProcessHandle,
    output: Accumulator,
    bytes_consumed: u64,
    bytes_forwarded: u64,
}

impl ProcessSink {
    /// Spawn the process and wrap it in a sink
    ///
    /// # Errors
    /// [`ContractError::ProcessSpawn`] if the process cannot be started.
    pub fn spawn(name: impl Into<String>, spec: &ProcessSpec) -> Result<Self, ContractError> {
        let name = name.into();
        let process = ProcessHandle::spawn(&name, spec)?;
        Ok(Self {
            name,
            process,
            output: Accumulator::new(),
            bytes_consumed: 0,
            bytes_forwarded: 0,
        })
    }

    /// Current process lifecycle state
    pub fn state(&self) -> ProcessState {
        self.process.state()
    }

    /// Bytes actually written to the process
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }

    /// Captured process output
    ///
    /// # Errors
    /// Fails before the process exited or when it wrote nothing.
    pub fn result(&self) -> Result<Bytes, ContractError> {
        self.output.result(&self.name)
    }
}

impl ChunkSink for ProcessSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn consume(&mut self, chunk: Chunk) -> Result<(), ContractError> {
        self.bytes_consumed += chunk.len() as u64;
        if !self.process.accepts_input() {
            trace!(sink = %self.name, bytes = chunk.len(), "Input closed, chunk not forwarded");
            return Ok(());
        }

        match self.process.write(&chunk).await {
            Ok(()) => {
                self.bytes_forwarded += chunk.len() as u64;
                Ok(())
            }
            Err(e) if e.is_broken_pipe() => {
                info!(
                    sink = %self.name,
                    forwarded = self.bytes_forwarded,
                    "Process closed its input, no longer forwarding"
                );
                self.process.record_broken_pipe();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(name = "process_sink_finish", skip(self), fields(sink = %self.name))]
    async fn finish(&mut self) -> Result<(), ContractError> {
        self.process.close_input();
        match self.process.wait().await {
            Ok(output) => {
                debug!(sink = %self.name, bytes = output.len(), "Process output captured");
                self.output = output;
                self.process.destroy(None).await
            }
            Err(e) => self.process.destroy(Some(e)).await,
        }
    }

    fn fault(&self) -> impl Future<Output = ContractError> + Send {
        self.process.failure()
    }

    fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    fn take_output(&mut self) -> Accumulator {
        std::mem::take(&mut self.output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_echo_process() {
        let mut sink = ProcessSink::spawn("echo", &ProcessSpec::new("cat")).unwrap();
        sink.consume(Bytes::from_static(b"frame ")).await.unwrap();
        sink.consume(Bytes::from_static(b"data")).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(sink.result().unwrap().as_ref(), b"frame data");
        assert_eq!(sink.bytes_consumed(), 10);
        assert_eq!(sink.bytes_forwarded(), 10);
    }

    #[tokio::test]
    async fn test_broken_pipe_is_tolerated() {
        let mut sink =
            ProcessSink::spawn("head", &sh("head -c 1 >/dev/null; printf 'hello world!'")).unwrap();
        let big = Bytes::from(vec![7u8; 1 << 20]);
        for _ in 0..4 {
            sink.consume(big.clone()).await.unwrap();
        }
        sink.finish().await.unwrap();

        assert_eq!(sink.result().unwrap().as_ref(), b"hello world!");
        assert_eq!(sink.bytes_consumed(), 4 << 20);
        assert!(sink.bytes_forwarded() < 4 << 20);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_finish() {
        let mut sink = ProcessSink::spawn("bad", &sh("cat >/dev/null; exit 2")).unwrap();
        sink.consume(Bytes::from_static(b"x")).await.unwrap();
        let err = sink.finish().await.unwrap_err();
        assert!(matches!(err, ContractError::ProcessExit { code: Some(2), .. }));
    }

    #[tokio::test]
    async fn test_fault_reports_timeout() {
        let spec = sh("sleep 5").timeout(Duration::from_millis(50));
        let sink = ProcessSink::spawn("slow", &spec).unwrap();
        let err = sink.fault().await;
        assert!(matches!(err, ContractError::ProcessTimeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_output_fails_result() {
        let mut sink = ProcessSink::spawn("silent", &sh("cat >/dev/null")).unwrap();
        sink.consume(Bytes::from_static(b"ignored")).await.unwrap();
        sink.finish().await.unwrap();
        assert!(matches!(
            sink.result(),
            Err(ContractError::EmptyResult { .. })
        ));
    }
}
