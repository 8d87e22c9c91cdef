//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{DetectorKind, DeviceBlueprint};
use serde::Serialize;
use step_engine::{advanced, basic, projector};
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    device: String,
    detector: DetectorInfo,
    sampling: SamplingInfo,
    source: SourceInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct DetectorInfo {
    kind: String,
    step_length_m: f32,
    user_weight_kg: f32,
    /// Tuning constants of the active variant
    constants: BTreeMap<&'static str, f64>,
    projector: BTreeMap<&'static str, f64>,
}

#[derive(Serialize)]
struct SamplingInfo {
    period_ms: u32,
    snapshot_interval_ms: u32,
    temperature_every: u32,
    status_every: u32,
}

#[derive(Serialize)]
struct SourceInfo {
    kind: String,
    realtime: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    cadence_hz: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration info");
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => DeviceBlueprint::default(),
    };

    let info = build_config_info(&blueprint);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn detector_constants(kind: DetectorKind) -> BTreeMap<&'static str, f64> {
    match kind {
        DetectorKind::Basic => BTreeMap::from([
            ("smoothing_alpha", f64::from(basic::SMOOTHING_ALPHA)),
            ("threshold_window", basic::THRESHOLD_WINDOW as f64),
            ("threshold_floor_g", f64::from(basic::THRESHOLD_FLOOR)),
            ("threshold_gain", f64::from(basic::THRESHOLD_GAIN)),
            ("step_debounce_ms", f64::from(basic::STEP_DEBOUNCE_MS)),
            ("kcal_per_step", basic::KCAL_PER_STEP),
        ]),
        DetectorKind::Advanced => BTreeMap::from([
            ("gravity_g", f64::from(advanced::GRAVITY_G)),
            ("history_len", advanced::HISTORY_LEN as f64),
            ("crossing_debounce_ms", f64::from(advanced::CROSSING_DEBOUNCE_MS)),
            ("min_peak_history", advanced::MIN_PEAK_HISTORY as f64),
            ("peak_window", advanced::PEAK_WINDOW as f64),
            ("peak_threshold_floor_g", f64::from(advanced::PEAK_THRESHOLD_FLOOR)),
            ("frequency_warmup_steps", advanced::FREQUENCY_WARMUP_STEPS as f64),
            ("min_step_rate_hz", f64::from(advanced::MIN_STEP_RATE_HZ)),
            ("max_step_rate_hz", f64::from(advanced::MAX_STEP_RATE_HZ)),
        ]),
    }
}

fn projector_constants() -> BTreeMap<&'static str, f64> {
    BTreeMap::from([
        ("recent_steps", projector::RECENT_STEPS as f64),
        ("fast_cadence_hz", f64::from(projector::FAST_CADENCE_HZ)),
        ("slow_cadence_hz", f64::from(projector::SLOW_CADENCE_HZ)),
    ])
}

fn build_config_info(blueprint: &DeviceBlueprint) -> ConfigInfo {
    let source = &blueprint.source;
    let is_replay = source.kind == contracts::SourceKind::Replay;

    ConfigInfo {
        device: blueprint.device.name.clone(),
        detector: DetectorInfo {
            kind: blueprint.detector.kind.to_string(),
            step_length_m: blueprint.detector.step_length_m,
            user_weight_kg: blueprint.detector.user_weight_kg,
            constants: detector_constants(blueprint.detector.kind),
            projector: projector_constants(),
        },
        sampling: SamplingInfo {
            period_ms: blueprint.sampling.period_ms,
            snapshot_interval_ms: blueprint.sampling.snapshot_interval_ms,
            temperature_every: blueprint.sampling.temperature_every,
            status_every: blueprint.sampling.status_every,
        },
        source: SourceInfo {
            kind: format!("{:?}", source.kind).to_lowercase(),
            realtime: source.realtime,
            cadence_hz: (!is_replay).then_some(source.cadence_hz),
            path: source
                .path
                .as_ref()
                .filter(|_| is_replay)
                .map(|p| p.display().to_string()),
        },
        sinks: blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: s.sink_type.as_str().to_string(),
                queue_capacity: s.queue_capacity,
                params: s.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            })
            .collect(),
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                    Pedometer Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📟 Device: {}", info.device);

    let d = &info.detector;
    println!("\n👣 Detector: {}", d.kind);
    println!("   ├─ Step length: {} m", d.step_length_m);
    println!("   ├─ User weight: {} kg", d.user_weight_kg);
    println!("   ├─ Constants");
    for (name, value) in &d.constants {
        println!("   │  ├─ {}: {}", name, value);
    }
    println!("   └─ Projector");
    let last = d.projector.len().saturating_sub(1);
    for (i, (name, value)) in d.projector.iter().enumerate() {
        let glyph = if i == last { "└─" } else { "├─" };
        println!("      {} {}: {}", glyph, name, value);
    }

    let s = &info.sampling;
    println!("\n⏱  Sampling");
    println!("   ├─ Period: {} ms", s.period_ms);
    println!("   ├─ Snapshot interval: {} ms", s.snapshot_interval_ms);
    println!("   ├─ Temperature every: {} samples", s.temperature_every);
    println!("   └─ Status every: {} snapshots", s.status_every);

    let src = &info.source;
    println!("\n📡 Source: {}", src.kind);
    if let Some(cadence) = src.cadence_hz {
        println!("   ├─ Cadence: {} Hz", cadence);
    }
    if let Some(ref path) = src.path {
        println!("   ├─ Recording: {}", path);
    }
    println!("   └─ Realtime: {}", src.realtime);

    if info.sinks.is_empty() {
        println!("\n📤 Sinks: none");
    } else {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for sink in &info.sinks {
            println!(
                "   ├─ {} ({}, queue {})",
                sink.name, sink.sink_type, sink.queue_capacity
            );
            for (key, value) in &sink.params {
                println!("   │  └─ {}: {}", key, value);
            }
        }
    }

    println!();
}
