//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DeviceBlueprint, SinkType, SourceKind};
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
    device: String,
    detector: String,
    source: String,
    sink_count: usize,
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
                    device: blueprint.device.name.clone(),
                    detector: blueprint.detector.kind.to_string(),
                    source: format!("{:?}", blueprint.source.kind).to_lowercase(),
                    sink_count: blueprint.sinks.len(),
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
fn collect_warnings(blueprint: &DeviceBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - snapshots will be dropped".to_string());
    }

    let source = &blueprint.source;
    if source.kind == SourceKind::Synthetic && source.amplitude_g == 0.0 {
        warnings.push("Synthetic amplitude is 0 - no steps will be detected".to_string());
    }
    if source.kind == SourceKind::Synthetic && source.realtime && source.duration_ms.is_none() {
        warnings.push("Synthetic source is unbounded - stop with Ctrl-C or --duration".to_string());
    }

    let step_hz = 1000.0 / blueprint.sampling.period_ms as f32;
    if source.kind == SourceKind::Synthetic && source.cadence_hz * 4.0 > step_hz {
        warnings.push(format!(
            "Sampling at {step_hz:.0} Hz gives fewer than 4 samples per step at {} Hz cadence",
            source.cadence_hz
        ));
    }

    for sink in &blueprint.sinks {
        if sink.sink_type == SinkType::Radio && !sink.params.contains_key("chunk_size") {
            warnings.push(format!(
                "Radio sink '{}' has no chunk_size - using the 20-byte default",
                sink.name
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
            println!("  Device: {}", summary.device);
            println!("  Detector: {}", summary.detector);
            println!("  Source: {}", summary.source);
            println!("  Sinks: {}", summary.sink_count);
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
