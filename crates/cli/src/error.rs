//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Size specification not understood
    #[error("Invalid size '{spec}': {message}")]
    InvalidSize { spec: String, message: String },

    /// Seek position not understood
    #[error("Invalid seek position '{value}': expected HH:MM:SS[.mmm] or seconds")]
    InvalidSeek { value: String },

    /// Input path unusable
    #[error("Invalid input {}: {message}", path.display())]
    InvalidInput { path: PathBuf, message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// A sink output file could not be written
    #[error("Failed to write {}: {source}", path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn invalid_size(spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSize {
            spec: spec.into(),
            message: message.into(),
        }
    }

    pub fn invalid_seek(value: impl Into<String>) -> Self {
        Self::InvalidSeek {
            value: value.into(),
        }
    }

    pub fn invalid_input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
