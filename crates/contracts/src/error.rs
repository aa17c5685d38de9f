//! Layered error definitions
//!
//! Categorized by source: config / source / sink / process

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Run configured without a usable sink set
    #[error("configuration error: {message}")]
    Configuration { message: String },

    // ===== Source Errors =====
    /// Reading the ordered byte source failed
    #[error("source error: {message}")]
    Source {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Downstream closed its input side. Tolerated, never surfaced from a run.
    #[error("sink '{sink_name}' input closed by downstream (broken pipe)")]
    BrokenPipe { sink_name: String },

    /// Sink completed without producing a single byte
    #[error("sink '{sink_name}' produced an empty result")]
    EmptyResult { sink_name: String },

    /// Result requested before the sink completed
    #[error("sink '{sink_name}' has not completed")]
    SinkIncomplete { sink_name: String },

    // ===== Process Errors =====
    /// External process could not be started
    #[error("sink '{sink_name}' failed to spawn '{program}': {source}")]
    ProcessSpawn {
        sink_name: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External process exited with a non-zero status
    #[error("sink '{sink_name}' process exited abnormally (code={code:?}, signal={signal:?})")]
    ProcessExit {
        sink_name: String,
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// External process outlived its timeout and was killed
    #[error("sink '{sink_name}' process timed out after {timeout_ms}ms")]
    ProcessTimeout { sink_name: String, timeout_ms: u64 },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create source error from an IO failure
    pub fn source(error: std::io::Error) -> Self {
        Self::Source {
            message: error.to_string(),
            source: Some(error),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    pub fn broken_pipe(sink_name: impl Into<String>) -> Self {
        Self::BrokenPipe {
            sink_name: sink_name.into(),
        }
    }

    pub fn empty_result(sink_name: impl Into<String>) -> Self {
        Self::EmptyResult {
            sink_name: sink_name.into(),
        }
    }

    pub fn sink_incomplete(sink_name: impl Into<String>) -> Self {
        Self::SinkIncomplete {
            sink_name: sink_name.into(),
        }
    }

    /// Classify a failed write to a sink's downstream.
    ///
    /// `BrokenPipe` IO errors become [`ContractError::BrokenPipe`], everything
    /// else is a fatal [`ContractError::SinkWrite`].
    pub fn from_write(sink_name: impl Into<String>, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::BrokenPipe {
            Self::broken_pipe(sink_name)
        } else {
            Self::sink_write(sink_name, error.to_string())
        }
    }

    /// Whether this error is the tolerated broken-pipe condition
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            Self::BrokenPipe { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::BrokenPipe,
            _ => false,
        }
    }

    /// Short, stable label (metrics and logs)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::ConfigValidation { .. } => "config_validation",
            Self::Configuration { .. } => "configuration",
            Self::Source { .. } => "source",
            Self::SinkWrite { .. } => "sink_write",
            Self::BrokenPipe { .. } => "broken_pipe",
            Self::EmptyResult { .. } => "empty_result",
            Self::SinkIncomplete { .. } => "sink_incomplete",
            Self::ProcessSpawn { .. } => "process_spawn",
            Self::ProcessExit { .. } => "process_exit",
            Self::ProcessTimeout { .. } => "process_timeout",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_from_write_classifies_broken_pipe() {
        let err = ContractError::from_write("frame", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_broken_pipe());
        assert!(matches!(err, ContractError::BrokenPipe { ref sink_name } if sink_name == "frame"));

        let err = ContractError::from_write("frame", io::Error::other("disk on fire"));
        assert!(!err.is_broken_pipe());
        assert_eq!(err.kind(), "sink_write");
    }

    #[test]
    fn test_io_broken_pipe_is_tolerated() {
        let err: ContractError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(err.is_broken_pipe());
    }

    #[test]
    fn test_process_exit_display() {
        let err = ContractError::ProcessExit {
            sink_name: "frame".into(),
            code: Some(3),
            signal: None,
        };
        assert_eq!(
            err.to_string(),
            "sink 'frame' process exited abnormally (code=Some(3), signal=None)"
        );
    }
}
