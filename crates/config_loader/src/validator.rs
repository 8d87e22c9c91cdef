//! 配置校验模块
//!
//! 两层校验：
//! - 字段级约束由 `validator` derive 声明在 `DeviceBlueprint` 上
//! - 跨字段规则在这里手写 (有限值、快照间隔、sink 唯一性与必填参数、回放路径)

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{ContractError, DeviceBlueprint, SinkConfig, SinkType, SourceKind};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Largest radio notification payload
pub const MAX_RADIO_CHUNK_SIZE: usize = 512;

/// 校验 DeviceBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &DeviceBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_finite(blueprint)?;
    validate_sampling(blueprint)?;
    validate_source(blueprint)?;
    validate_sinks(&blueprint.sinks)?;
    Ok(())
}

/// 字段级约束 (derive)
fn validate_fields(blueprint: &DeviceBlueprint) -> Result<(), ContractError> {
    let Err(errors) = blueprint.validate() else {
        return Ok(());
    };

    let mut issues = Vec::new();
    flatten_errors(&errors, String::new(), &mut issues);
    // HashMap order is unstable; report the lexically first path
    issues.sort();

    match issues.into_iter().next() {
        Some((field, message)) => Err(ContractError::config_validation(field, message)),
        None => Ok(()),
    }
}

fn flatten_errors(errors: &ValidationErrors, prefix: String, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    out.push((path.clone(), describe(e)));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_errors(inner, path, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    flatten_errors(inner, format!("{path}[{idx}]"), out);
                }
            }
        }
    }
}

fn describe(error: &validator::ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let mut bounds: Vec<String> = error
        .params
        .iter()
        .filter(|(k, _)| k.as_ref() != "value")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    bounds.sort();

    match error.params.get("value") {
        Some(value) => format!("{} check failed ({}), got {}", error.code, bounds.join(", "), value),
        None => format!("{} check failed ({})", error.code, bounds.join(", ")),
    }
}

/// 浮点参数必须是有限值 (TOML 允许 nan/inf)
fn validate_finite(blueprint: &DeviceBlueprint) -> Result<(), ContractError> {
    let checks = [
        ("detector.step_length_m", blueprint.detector.step_length_m as f64),
        ("detector.user_weight_kg", blueprint.detector.user_weight_kg as f64),
        ("source.cadence_hz", blueprint.source.cadence_hz as f64),
        ("source.amplitude_g", blueprint.source.amplitude_g as f64),
        ("source.noise_g", blueprint.source.noise_g as f64),
        ("source.speed_multiplier", blueprint.source.speed_multiplier),
    ];

    for (field, value) in checks {
        if !value.is_finite() {
            return Err(ContractError::config_validation(
                field,
                format!("must be a finite number, got {value}"),
            ));
        }
    }
    Ok(())
}

/// 快照间隔不能短于采样周期
fn validate_sampling(blueprint: &DeviceBlueprint) -> Result<(), ContractError> {
    let sampling = &blueprint.sampling;
    if sampling.snapshot_interval_ms < sampling.period_ms {
        return Err(ContractError::config_validation(
            "sampling.snapshot_interval_ms",
            format!(
                "snapshot_interval_ms ({}) must be >= period_ms ({})",
                sampling.snapshot_interval_ms, sampling.period_ms
            ),
        ));
    }
    Ok(())
}

fn validate_source(blueprint: &DeviceBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;
    if source.kind == SourceKind::Replay {
        let has_path = source
            .path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if !has_path {
            return Err(ContractError::config_validation(
                "source.path",
                "replay source requires a recording path",
            ));
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(sinks: &[SinkConfig]) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in sinks.iter().enumerate() {
        if sink.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        validate_sink_params(idx, sink)?;
    }
    Ok(())
}

fn validate_sink_params(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    let required = |key: &str| -> Result<&str, ContractError> {
        sink.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ContractError::config_validation(
                    format!("sinks[{idx}].params.{key}"),
                    format!("{} sink '{}' requires '{key}'", sink.sink_type.as_str(), sink.name),
                )
            })
    };
    let socket_addr = |key: &str| -> Result<(), ContractError> {
        let raw = required(key)?;
        raw.parse::<SocketAddr>().map(|_| ()).map_err(|e| {
            ContractError::config_validation(
                format!("sinks[{idx}].params.{key}"),
                format!("invalid socket address '{raw}': {e}"),
            )
        })
    };

    match sink.sink_type {
        SinkType::Log => {}
        SinkType::File => {
            required("path")?;
        }
        SinkType::Network => socket_addr("bind")?,
        SinkType::Radio => {
            socket_addr("bind")?;
            if let Some(raw) = sink.params.get("chunk_size") {
                let valid = raw
                    .trim()
                    .parse::<usize>()
                    .is_ok_and(|n| (1..=MAX_RADIO_CHUNK_SIZE).contains(&n));
                if !valid {
                    return Err(ContractError::config_validation(
                        format!("sinks[{idx}].params.chunk_size"),
                        format!("chunk_size must be within 1..={MAX_RADIO_CHUNK_SIZE}, got '{raw}'"),
                    ));
                }
            }
        }
    }
    Ok(())
}
