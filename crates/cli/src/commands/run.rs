//! `run` command implementation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{DeviceBlueprint, SinkConfig, SinkType, SourceKind};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let blueprint = load_blueprint(args)?;

    info!(
        device = %blueprint.device.name,
        detector = %blueprint.detector.kind,
        source = ?blueprint.source.kind,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        ..PipelineConfig::new(blueprint)
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(setup_shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        steps = stats.steps_detected,
        snapshots = stats.snapshots_sent,
        sink_errors = stats.sink_errors(),
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("Pedometer finished");
    Ok(())
}

/// Load the config file (or defaults) and apply CLI overrides
fn load_blueprint(args: &RunArgs) -> Result<DeviceBlueprint> {
    let mut blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .map_err(CliError::from)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file given, using built-in defaults");
            DeviceBlueprint {
                sinks: vec![default_log_sink()],
                ..Default::default()
            }
        }
    };

    let mut overridden = false;
    if let Some(detector) = args.detector {
        info!(detector = ?detector, "Overriding detector from CLI");
        blueprint.detector.kind = detector.into();
        overridden = true;
    }
    if let Some(path) = &args.replay {
        info!(path = %path.display(), "Replaying recorded session");
        blueprint.source.kind = SourceKind::Replay;
        blueprint.source.path = Some(path.clone());
        blueprint.source.loop_playback = args.replay_loop;
        if let Some(speed) = args.replay_speed {
            blueprint.source.speed_multiplier = speed;
        }
        overridden = true;
    }

    if overridden {
        config_loader::ConfigLoader::validate(&blueprint)
            .map_err(CliError::from)
            .context("Configuration invalid after CLI overrides")?;
    }
    if blueprint.sinks.is_empty() {
        warn!("No sinks configured");
    }

    Ok(blueprint)
}

fn default_log_sink() -> SinkConfig {
    SinkConfig {
        name: "console".to_string(),
        sink_type: SinkType::Log,
        queue_capacity: 16,
        params: HashMap::new(),
    }
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, stopping pipeline...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &DeviceBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Device: {}", blueprint.device.name);
    println!("\nDetector:");
    println!("  Kind: {}", blueprint.detector.kind);
    println!("  Step length: {} m", blueprint.detector.step_length_m);
    println!("  User weight: {} kg", blueprint.detector.user_weight_kg);

    println!("\nSampling:");
    println!("  Period: {} ms", blueprint.sampling.period_ms);
    println!("  Snapshot interval: {} ms", blueprint.sampling.snapshot_interval_ms);

    let source = &blueprint.source;
    println!("\nSource: {:?}", source.kind);
    match source.kind {
        SourceKind::Synthetic => {
            println!("  Cadence: {} Hz", source.cadence_hz);
            println!("  Amplitude: {} g", source.amplitude_g);
        }
        SourceKind::Replay => {
            if let Some(path) = &source.path {
                println!("  Recording: {}", path.display());
            }
            println!("  Speed: {}x", source.speed_multiplier);
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({})", sink.name, sink.sink_type.as_str());
        }
    }

    println!();
}
