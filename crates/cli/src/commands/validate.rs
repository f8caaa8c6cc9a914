//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::SyncBlueprint;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
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
    version: String,
    stream_count: usize,
    synchronizable_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary: Option<String>,
    window_length_ms: f64,
    rate_tolerance: f64,
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

    match load_blueprint(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
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
                    version: format!("{:?}", blueprint.version),
                    stream_count: blueprint.streams.len(),
                    synchronizable_count: blueprint
                        .streams
                        .iter()
                        .filter(|s| s.sync_channel.is_some())
                        .count(),
                    primary: blueprint.sync.primary.map(|p| p.to_string()),
                    window_length_ms: blueprint.sync.window_length_ms,
                    rate_tolerance: blueprint.sync.rate_tolerance,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("{e:#}")),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SyncBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sync.primary.is_none() {
        warnings.push(
            "No primary stream configured - every stream stays unsynchronized".to_string(),
        );
    }

    if blueprint.streams.len() < 2 {
        warnings.push("Fewer than two streams - sync pulses will be ignored".to_string());
    }

    for stream in &blueprint.streams {
        if stream.sync_channel.is_none() {
            warnings.push(format!(
                "Stream '{}' has no sync_channel and will report status 'off'",
                stream.label()
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Streams: {} ({} with sync channel)",
                summary.stream_count, summary.synchronizable_count
            );
            println!(
                "  Primary: {}",
                summary.primary.as_deref().unwrap_or("(none)")
            );
            println!("  Window: {} ms", summary.window_length_ms);
            println!("  Rate tolerance: {}", summary.rate_tolerance);
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
