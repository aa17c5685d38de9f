//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// stream-tee - copy one byte stream into several sinks at once
#[derive(Parser, Debug)]
#[command(
    name = "stream-tee",
    author,
    version,
    about = "Fan one input stream out to several sinks",
    long_about = "Reads one input file once and feeds it, chunk by chunk, to several sinks \n\
                  in parallel: in-memory copies and external processes such as ffmpeg.\n\n\
                  The run succeeds only if every sink succeeds with non-empty output."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "STREAM_TEE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "STREAM_TEE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus metrics port (disabled when unset)
    #[arg(long, global = true, env = "STREAM_TEE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a video and extract one frame from it in a single pass
    Extract(ExtractArgs),

    /// Run the sinks described by a configuration file
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `extract` command
#[derive(Parser, Debug, Clone)]
pub struct ExtractArgs {
    /// Input file
    pub input: PathBuf,

    /// Directory receiving the copy and the frame (created if missing)
    pub output_dir: PathBuf,

    /// Frame size: `NN%` or `WxH`, one side may be `?`
    #[arg(short, long, env = "STREAM_TEE_SIZE")]
    pub size: Option<String>,

    /// Position of the frame: `HH:MM:SS[.mmm]` or seconds
    #[arg(long, default_value = "00:00:00", env = "STREAM_TEE_SEEK")]
    pub seek: String,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg", env = "FFMPEG_PATH")]
    pub ffmpeg: PathBuf,

    /// ffmpeg timeout in seconds
    #[arg(long, default_value = "30", env = "STREAM_TEE_TIMEOUT")]
    pub timeout: u64,

    /// Read size in bytes
    #[arg(long, default_value = "65536", env = "STREAM_TEE_CHUNK_SIZE")]
    pub chunk_size: usize,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "stream-tee.toml",
        env = "STREAM_TEE_CONFIG"
    )]
    pub config: PathBuf,

    /// Input file
    pub input: PathBuf,

    /// Directory receiving one file per sink (created if missing)
    pub output_dir: PathBuf,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(
        short,
        long,
        default_value = "stream-tee.toml",
        env = "STREAM_TEE_CONFIG"
    )]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_defaults() {
        let cli = Cli::try_parse_from(["stream-tee", "extract", "in.mp4", "out"]).unwrap();
        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(args.input, PathBuf::from("in.mp4"));
                assert_eq!(args.seek, "00:00:00");
                assert_eq!(args.chunk_size, 65536);
                assert!(args.size.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from(["stream-tee", "-v", "-q", "validate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_requires_paths() {
        assert!(Cli::try_parse_from(["stream-tee", "run", "--config", "x.toml"]).is_err());
        let cli =
            Cli::try_parse_from(["stream-tee", "run", "-c", "x.toml", "in.bin", "out"]).unwrap();
        assert!(matches!(cli.command, Commands::Run(_)));
    }
}
