//! `extract` command implementation.
//!
//! One pass over the input feeds two sinks: `original` keeps a byte-exact copy,
//! `frame` pipes the stream through ffmpeg and keeps the encoded JPEG.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::ProcessSpec;
use fanout::{ChunkSource, Fanout};
use tracing::{debug, info};

use super::output::{check_input, prepare_dir, write_output};
use crate::cli::ExtractArgs;
use crate::error::CliError;

/// Sink keeping the original payload
pub const ORIGINAL_SINK: &str = "original";
/// Sink producing the extracted frame
pub const FRAME_SINK: &str = "frame";

const SOURCE_QUEUE_CHUNKS: usize = 4;

/// Requested frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// Scale both sides by a percentage
    Percent(u32),
    /// Explicit dimensions. A missing side keeps the aspect ratio.
    Dimensions {
        width: Option<u32>,
        height: Option<u32>,
    },
}

impl SizeSpec {
    /// ffmpeg `scale` filter for this size
    pub fn scale_filter(&self) -> String {
        match self {
            Self::Percent(pct) => format!("scale=iw*{pct}/100:ih*{pct}/100"),
            Self::Dimensions { width, height } => {
                let side = |v: &Option<u32>| v.map_or_else(|| "-1".to_string(), |v| v.to_string());
                format!("scale={}:{}", side(width), side(height))
            }
        }
    }
}

impl FromStr for SizeSpec {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if let Some(pct) = spec.strip_suffix('%') {
            let pct: u32 = pct
                .parse()
                .map_err(|_| CliError::invalid_size(s, "percentage must be a whole number"))?;
            if pct == 0 {
                return Err(CliError::invalid_size(s, "percentage must be positive"));
            }
            return Ok(Self::Percent(pct));
        }

        let (w, h) = spec
            .split_once(['x', 'X'])
            .ok_or_else(|| CliError::invalid_size(s, "expected NN% or WxH"))?;
        let dimension = |part: &str| -> Result<Option<u32>, CliError> {
            match part.trim() {
                "?" => Ok(None),
                value => match value.parse::<u32>() {
                    Ok(0) | Err(_) => Err(CliError::invalid_size(
                        s,
                        "dimensions must be positive integers or '?'",
                    )),
                    Ok(v) => Ok(Some(v)),
                },
            }
        };
        let width = dimension(w)?;
        let height = dimension(h)?;
        if width.is_none() && height.is_none() {
            return Err(CliError::invalid_size(s, "at least one dimension is required"));
        }
        Ok(Self::Dimensions { width, height })
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(pct) => write!(f, "{pct}%"),
            Self::Dimensions { width, height } => {
                let side = |v: &Option<u32>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
                write!(f, "{}x{}", side(width), side(height))
            }
        }
    }
}

/// Check a seek position: `HH:MM:SS[.frac]`, `MM:SS[.frac]` or plain seconds
pub fn parse_seek(value: &str) -> Result<String, CliError> {
    let invalid = || CliError::invalid_seek(value);
    let seek = value.trim();
    if seek.is_empty() {
        return Err(invalid());
    }

    let parts: Vec<&str> = seek.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }
    let (last, leading) = parts.split_last().ok_or_else(invalid)?;

    let seconds: f64 = last.parse().map_err(|_| invalid())?;
    let digits_only = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    let seconds_ok = last
        .split_once('.')
        .map_or_else(|| digits_only(last), |(i, f)| digits_only(i) && digits_only(f));
    if !seconds_ok || (!leading.is_empty() && seconds >= 60.0) {
        return Err(invalid());
    }

    for (i, part) in leading.iter().enumerate() {
        if !digits_only(part) {
            return Err(invalid());
        }
        // minutes are bounded when hours are present
        if leading.len() == 2 && i == 1 && part.parse::<u32>().map_or(true, |m| m >= 60) {
            return Err(invalid());
        }
    }
    Ok(seek.to_string())
}

/// ffmpeg arguments that read the stream on stdin and write one JPEG to stdout
pub fn ffmpeg_args(seek: &str, size: Option<&SizeSpec>) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-i", "pipe:0", "-ss", seek, "-vframes", "1"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some(size) = size {
        args.push("-vf".to_string());
        args.push(size.scale_filter());
    }
    args.extend(
        [
            "-f", "image2", "-vcodec", "mjpeg", "-loglevel", "error", "-nostdin", "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

/// Output file names: the input file name for the copy, `<stem>.jpg` for the frame
pub fn output_names(input: &Path) -> Result<(String, String), CliError> {
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::invalid_input(input, "no usable file name"))?;
    let stem = input
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    Ok((file_name.to_string(), format!("{stem}.jpg")))
}

/// Execute the `extract` command
pub async fn run_extract(args: &ExtractArgs) -> Result<()> {
    let size = args.size.as_deref().map(SizeSpec::from_str).transpose()?;
    let seek = parse_seek(&args.seek)?;
    let (copy_name, frame_name) = output_names(&args.input)?;

    check_input(&args.input).await?;
    prepare_dir(&args.output_dir).await?;

    let spec = ProcessSpec::new(args.ffmpeg.to_string_lossy())
        .args(ffmpeg_args(&seek, size.as_ref()))
        .timeout(Duration::from_secs(args.timeout));
    info!(
        input = %args.input.display(),
        size = ?size.map(|s| s.to_string()),
        seek = %seek,
        ffmpeg = %args.ffmpeg.display(),
        "Extracting frame"
    );
    debug!(args = ?spec.args, "ffmpeg arguments");

    let fanout = Fanout::builder()
        .accumulating(ORIGINAL_SINK)
        .process(FRAME_SINK, &spec)
        .context("Failed to start ffmpeg")?
        .build()?;
    let source = ChunkSource::from_path(&args.input, args.chunk_size, SOURCE_QUEUE_CHUNKS).await?;

    let (outcome, summary) = fanout.run_with_summary(source).await;
    let result = outcome.context("Extraction failed")?;

    for (sink, file_name) in [(ORIGINAL_SINK, &copy_name), (FRAME_SINK, &frame_name)] {
        let bytes = result
            .get(sink)
            .with_context(|| format!("Sink '{sink}' missing from result"))?;
        let path = write_output(&args.output_dir, file_name, bytes).await?;
        println!("{}", path.display());
    }
    debug!("\n{summary}");

    Ok(())
}
