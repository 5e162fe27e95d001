//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, SinkType};
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
    version: String,
    producer: String,
    mode: String,
    sink_count: usize,
    metrics_port: Option<u16>,
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
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    producer: config_loader::producer_name(&blueprint),
                    mode: format!("{:?}", blueprint.dispatch.mode),
                    sink_count: blueprint.sinks.len(),
                    metrics_port: blueprint.metrics.port.filter(|port| *port != 0),
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
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.dispatch.graceful_shutdown_secs > 0 {
        warnings.push(format!(
            "A sink crash terminates the process after {}s",
            blueprint.dispatch.graceful_shutdown_secs
        ));
    }

    if blueprint.tap.command.is_some() && blueprint.tap.checkpoint.is_some() {
        warnings.push("tap.checkpoint is ignored for command producers".to_string());
    }

    if blueprint.tap.command.is_some() && blueprint.tap.schema.is_some() {
        warnings.push("tap.schema is ignored for command producers".to_string());
    }

    if blueprint
        .sinks
        .iter()
        .all(|sink| sink.sink_type == SinkType::Log)
    {
        warnings.push("Only log sinks configured - records are not persisted".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Producer: {}", summary.producer);
            println!("  Mode: {}", summary.mode);
            println!("  Sinks: {}", summary.sink_count);
            match summary.metrics_port {
                Some(port) => println!("  Metrics port: {port}"),
                None => println!("  Metrics: disabled"),
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
