//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{FanoutConfig, SinkKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    queue_capacity: usize,
    chunk_size: usize,
    sinks: Vec<SinkSummary>,
}

#[derive(Serialize)]
struct SinkSummary {
    name: String,
    kind: SinkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    program: Option<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    queue_capacity: config.queue_capacity,
                    chunk_size: config.chunk_size,
                    sinks: config
                        .sinks
                        .iter()
                        .map(|sink| SinkSummary {
                            name: sink.name.clone(),
                            kind: sink.kind,
                            program: sink.process.as_ref().map(|p| p.program.clone()),
                        })
                        .collect(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &FanoutConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for sink in &config.sinks {
        if let Some(process) = &sink.process {
            if process.timeout_ms < 1000 {
                warnings.push(format!(
                    "Sink '{}' has a timeout of {}ms, processes may be killed early",
                    sink.name, process.timeout_ms
                ));
            }
        }
    }

    if config.sinks.len() == 1 {
        warnings.push("Only one sink configured, nothing is fanned out".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Queue capacity: {}", summary.queue_capacity);
            println!("  Chunk size: {}", summary.chunk_size);
            println!("  Sinks ({}):", summary.sinks.len());
            for sink in &summary.sinks {
                match &sink.program {
                    Some(program) => println!("    - {} ({:?}: {})", sink.name, sink.kind, program),
                    None => println!("    - {} ({:?})", sink.name, sink.kind),
                }
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
