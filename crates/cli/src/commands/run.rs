//! `run` command implementation.

use anyhow::{Context, Result};
use fanout::{ChunkSource, FanoutBuilder};
use tracing::info;

use super::output::{check_input, prepare_dir, write_output};
use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_config(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::ConfigNotFound {
            path: args.config.clone(),
        }
        .into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        sinks = config.sinks.len(),
        queue_capacity = config.queue_capacity,
        chunk_size = config.chunk_size,
        "Configuration loaded"
    );

    check_input(&args.input).await?;
    prepare_dir(&args.output_dir).await?;

    let fanout = FanoutBuilder::from_config(&config)
        .context("Failed to start sinks")?
        .build()?;
    let source =
        ChunkSource::from_path(&args.input, config.chunk_size, config.queue_capacity).await?;

    let (outcome, summary) = fanout.run_with_summary(source).await;
    let result = outcome.context("Run failed")?;

    for (sink, bytes) in result.iter() {
        let path = write_output(&args.output_dir, sink, bytes).await?;
        println!("{}", path.display());
    }
    print!("{summary}");

    Ok(())
}
