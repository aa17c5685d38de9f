//! Process lifecycle manager
//!
//! Spawns one external process with piped stdin/stdout/stderr and supervises it:
//!
//! ```text
//!   Starting ──▶ Running ──▶ (InputClosed) ──▶ Exited | Failed
//! ```
//!
//! - stdout is drained into an [`Accumulator`] by a reader task
//! - stderr is routed to `tracing` only
//! - a supervisor task races `wait()`, the timeout timer and cancellation
//! - a non-zero exit counts as a failure only if our input side was closed
//!   before the process exited; a process that exits while we still hold its
//!   input has stopped reading, which is the broken-pipe case

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use contracts::{Accumulator, CompletionSignal, ContractError, ProcessSpec};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lifecycle state of one process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    /// Input side closed, process still alive
    InputClosed,
    /// Exited normally, or non-zero after it stopped reading its input
    Exited { code: Option<i32> },
    Failed(ProcessFailure),
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Failed(_))
    }
}

/// Why a process ended in [`ProcessState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    /// Non-zero exit with no earlier tolerated failure
    Exit {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Killed by the timeout timer, or stdout still open at the deadline
    Timeout { timeout_ms: u64 },
    /// Waiting on the child failed
    Wait { message: String },
    /// Killed by [`ProcessHandle::destroy`] or drop
    Destroyed,
}

impl ProcessFailure {
    pub fn into_error(self, sink_name: &str) -> ContractError {
        match self {
            Self::Exit { code, signal } => ContractError::ProcessExit {
                sink_name: sink_name.to_string(),
                code,
                signal,
            },
            Self::Timeout { timeout_ms } => ContractError::ProcessTimeout {
                sink_name: sink_name.to_string(),
                timeout_ms,
            },
            Self::Wait { message } => {
                ContractError::Other(format!("sink '{sink_name}' wait failed: {message}"))
            }
            Self::Destroyed => {
                ContractError::Other(format!("sink '{sink_name}' process was destroyed"))
            }
        }
    }
}

/// Handle to one running external process
///
/// Owned exclusively by its sink. Dropping the handle kills the process.
pub struct ProcessHandle {
    sink_name: String,
    stdin: Option<ChildStdin>,
    state_tx: Arc<watch::Sender<ProcessState>>,
    state_rx: watch::Receiver<ProcessState>,
    input: Arc<InputSide>,
    deadline: Instant,
    timeout: Duration,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
    stdout_reader: Option<JoinHandle<std::io::Result<Accumulator>>>,
    diagnostics: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl ProcessHandle {
    /// Spawn `spec.program` and start supervising it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// [`ContractError::ProcessSpawn`] if the process cannot be started.
    #[instrument(
        name = "process_spawn",
        skip_all,
        fields(sink = %sink_name, program = %spec.program)
    )]
    pub fn spawn(sink_name: &str, spec: &ProcessSpec) -> Result<Self, ContractError> {
        let (state_tx, state_rx) = watch::channel(ProcessState::Starting);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let spawn_error = |source: std::io::Error| ContractError::ProcessSpawn {
            sink_name: sink_name.to_string(),
            program: spec.program.clone(),
            source,
        };

        let mut child = command.spawn().map_err(spawn_error)?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stderr not captured")))?;

        let state_tx = Arc::new(state_tx);
        let input = Arc::new(InputSide::default());
        let timeout = spec.timeout_duration();
        let deadline = Instant::now() + timeout;
        let cancel = CancellationToken::new();

        state_tx.send_replace(ProcessState::Running);
        info!(pid = ?child.id(), args = ?spec.args, "Process started");

        let supervisor = tokio::spawn(supervise(
            sink_name.to_string(),
            child,
            timeout,
            deadline,
            cancel.clone(),
            Arc::clone(&state_tx),
            Arc::clone(&input),
        ));
        let stdout_reader = tokio::spawn(read_output(stdout));
        let diagnostics = tokio::spawn(log_diagnostics(sink_name.to_string(), stderr));

        Ok(Self {
            sink_name: sink_name.to_string(),
            stdin,
            state_tx,
            state_rx,
            input,
            deadline,
            timeout,
            cancel,
            supervisor: Some(supervisor),
            stdout_reader: Some(stdout_reader),
            diagnostics: Some(diagnostics),
            destroyed: false,
        })
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        self.state_rx.borrow().clone()
    }

    /// Whether the input side is still open
    pub fn accepts_input(&self) -> bool {
        self.stdin.is_some()
    }

    /// Write all of `data` to the process input.
    ///
    /// Suspends while the pipe is full and resumes once the process reads.
    ///
    /// # Errors
    /// - [`ContractError::BrokenPipe`] if the process closed its input or exited
    /// - the process failure if it timed out or was destroyed while the write
    ///   was pending
    /// - [`ContractError::SinkWrite`] for any other write failure
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ContractError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ContractError::broken_pipe(&self.sink_name));
        };
        let mut state_rx = self.state_rx.clone();

        tokio::select! {
            biased;
            result = stdin.write_all(data) => {
                result.map_err(|e| ContractError::from_write(&self.sink_name, e))
            }
            state = wait_terminal(&mut state_rx) => match state {
                ProcessState::Failed(failure) => Err(failure.into_error(&self.sink_name)),
                _ => Err(ContractError::broken_pipe(&self.sink_name)),
            },
        }
    }

    /// Remember a tolerated broken pipe and stop writing.
    ///
    /// A later non-zero exit is then no longer classified as a failure.
    pub fn record_broken_pipe(&mut self) {
        self.input.broken_pipe.store(true, Ordering::Release);
        self.close_input();
    }

    /// Close the input side so the process sees end of stream
    pub fn close_input(&mut self) {
        // Flag before drop: the process can only see EOF after the store.
        self.input.closed.store(true, Ordering::Release);
        if self.stdin.take().is_some() {
            self.state_tx.send_if_modified(|state| {
                if *state == ProcessState::Running {
                    *state = ProcessState::InputClosed;
                    true
                } else {
                    false
                }
            });
            debug!(sink = %self.sink_name, "Process input closed");
        }
    }

    /// Resolves with the failure if the process ends in [`ProcessState::Failed`].
    ///
    /// Never resolves for a process that exits normally.
    pub fn failure(&self) -> impl Future<Output = ContractError> + Send + 'static {
        let mut state_rx = self.state_rx.clone();
        let sink_name = self.sink_name.clone();
        async move {
            let failure = match state_rx
                .wait_for(|state| matches!(state, ProcessState::Failed(_)))
                .await
            {
                Ok(state) => match &*state {
                    ProcessState::Failed(failure) => Some(failure.clone()),
                    _ => None,
                },
                Err(_) => None,
            };
            match failure {
                Some(failure) => failure.into_error(&sink_name),
                None => std::future::pending().await,
            }
        }
    }

    /// Wait for the process to exit and return everything it wrote to stdout.
    ///
    /// Draining stdout after the exit is bounded by the same deadline as the
    /// process, so a descendant holding stdout open cannot outlive the timeout.
    ///
    /// # Errors
    /// The classified failure if the process ended in [`ProcessState::Failed`],
    /// or [`ContractError::ProcessTimeout`] if stdout is still open at the deadline.
    pub async fn wait(&mut self) -> Result<Accumulator, ContractError> {
        let mut state_rx = self.state_rx.clone();
        if let ProcessState::Failed(failure) = wait_terminal(&mut state_rx).await {
            return Err(failure.into_error(&self.sink_name));
        }

        let reader = self
            .stdout_reader
            .take()
            .ok_or_else(|| {
                ContractError::Other(format!("sink '{}' output already taken", self.sink_name))
            })?;

        let abort = reader.abort_handle();
        let Ok(joined) = tokio::time::timeout_at(self.deadline, reader).await else {
            abort.abort();
            let failure = ProcessFailure::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            };
            warn!(sink = %self.sink_name, "Process output still open at deadline");
            self.state_tx.send_replace(ProcessState::Failed(failure.clone()));
            return Err(failure.into_error(&self.sink_name));
        };

        match joined {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ContractError::sink_write(
                &self.sink_name,
                format!("reading process output: {e}"),
            )),
            Err(e) => Err(ContractError::Other(format!(
                "sink '{}' output reader failed: {e}",
                self.sink_name
            ))),
        }
    }

    /// Tear the process down. Idempotent.
    ///
    /// Cancels the timer and kills the process if it is still running. A
    /// broken-pipe `pending` error is swallowed, any other is returned.
    #[instrument(name = "process_destroy", skip_all, fields(sink = %self.sink_name))]
    pub async fn destroy(&mut self, pending: Option<ContractError>) -> Result<(), ContractError> {
        if !self.destroyed {
            self.destroyed = true;
            self.close_input();
            self.cancel.cancel();
            if let Some(supervisor) = self.supervisor.take() {
                if let Err(e) = supervisor.await {
                    warn!(sink = %self.sink_name, error = ?e, "Supervisor task panicked");
                }
            }
            if let Some(reader) = self.stdout_reader.take() {
                reader.abort();
            }
            if let Some(diagnostics) = self.diagnostics.take() {
                diagnostics.abort();
            }
            debug!(sink = %self.sink_name, state = ?self.state(), "Process destroyed");
        }

        match pending {
            Some(error) if error.is_broken_pipe() => {
                debug!(sink = %self.sink_name, "Broken pipe swallowed on destroy");
                Ok(())
            }
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn wait_terminal(state_rx: &mut watch::Receiver<ProcessState>) -> ProcessState {
    match state_rx.wait_for(ProcessState::is_terminal).await {
        Ok(state) => (*state).clone(),
        Err(_) => ProcessState::Failed(ProcessFailure::Wait {
            message: "supervisor stopped without a final state".to_string(),
        }),
    }
}

/// Who closed the process input, shared with the supervisor
#[derive(Debug, Default)]
struct InputSide {
    /// We closed stdin (end of stream, broken pipe or destroy)
    closed: AtomicBool,
    /// A write hit a broken pipe
    broken_pipe: AtomicBool,
}

impl InputSide {
    /// The process stopped reading before we finished writing
    fn abandoned_by_process(&self) -> bool {
        self.broken_pipe.load(Ordering::Acquire) || !self.closed.load(Ordering::Acquire)
    }
}

async fn supervise(
    sink_name: String,
    mut child: Child,
    timeout: Duration,
    deadline: Instant,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<ProcessState>>,
    input: Arc<InputSide>,
) {
    let state = tokio::select! {
        status = child.wait() => classify(&sink_name, status, &input),
        _ = tokio::time::sleep_until(deadline) => {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(sink = %sink_name, timeout_ms, "Process timed out, killing");
            if let Err(e) = child.kill().await {
                warn!(sink = %sink_name, error = %e, "Kill after timeout failed");
            }
            ProcessState::Failed(ProcessFailure::Timeout { timeout_ms })
        }
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(sink = %sink_name, error = %e, "Kill on destroy failed");
            }
            ProcessState::Failed(ProcessFailure::Destroyed)
        }
    };

    state_tx.send_replace(state);
}

fn classify(
    sink_name: &str,
    status: std::io::Result<ExitStatus>,
    input: &InputSide,
) -> ProcessState {
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            return ProcessState::Failed(ProcessFailure::Wait {
                message: e.to_string(),
            })
        }
    };

    let code = status.code();
    observability::record_process_exit(sink_name, code);

    if status.success() {
        debug!(sink = %sink_name, "Process exited normally");
        return ProcessState::Exited { code };
    }

    let signal = exit_signal(&status);
    if input.abandoned_by_process() {
        warn!(
            sink = %sink_name,
            code = ?code,
            signal = ?signal,
            "Process exited abnormally after closing its input, not reported"
        );
        ProcessState::Exited { code }
    } else {
        warn!(sink = %sink_name, code = ?code, signal = ?signal, "Process exited abnormally");
        ProcessState::Failed(ProcessFailure::Exit { code, signal })
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

async fn read_output(mut stdout: ChildStdout) -> std::io::Result<Accumulator> {
    let mut output = Accumulator::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        buf.reserve(READ_BUFFER_SIZE);
        if stdout.read_buf(&mut buf).await? == 0 {
            break;
        }
        output.push(buf.split().freeze());
    }
    output.mark_complete(CompletionSignal::End);
    Ok(output)
}

async fn log_diagnostics(sink_name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => {
                let line = String::from_utf8_lossy(&line);
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(sink = %sink_name, "stderr: {}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(sink = %sink_name, error = %e, "stderr read failed");
                break;
            }
        }
    }
}
