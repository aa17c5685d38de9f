//! FanoutConfig - Config Loader output
//!
//! Describes one run: queueing parameters and the fixed sink set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Chunks buffered per sink before the Distributor waits
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum chunk size when reading a file source
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Sinks, in declaration order
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            chunk_size: default_chunk_size(),
            sinks: Vec::new(),
        }
    }
}

fn default_queue_capacity() -> usize {
    16
}

fn default_chunk_size() -> usize {
    64 * 1024
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink kind
    pub kind: SinkKind,

    /// Process settings, required for [`SinkKind::Process`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessSpec>,
}

impl SinkConfig {
    pub fn accumulate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SinkKind::Accumulate,
            process: None,
        }
    }

    pub fn process(name: impl Into<String>, spec: ProcessSpec) -> Self {
        Self {
            name: name.into(),
            kind: SinkKind::Process,
            process: Some(spec),
        }
    }
}

/// Sink kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Keep every chunk, result is the concatenation
    Accumulate,
    /// Pipe chunks through an external process, result is its stdout
    Process,
}

/// External process invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Executable name or path
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables (inherited environment is kept)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Kill the process if it has not exited after this long
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
