//! 蓝图解码
//!
//! TOML 为主，JSON 可选。解析错误带上行列号；相对路径 (回放录制、
//! 会话文件) 以配置文件所在目录为基准。

use std::fmt;
use std::path::Path;

use contracts::{ContractError, DeviceBlueprint, SinkType};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式 (忽略大小写)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a blueprint; no validation happens here
pub fn parse(content: &str, format: ConfigFormat) -> Result<DeviceBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| toml_error(content, e)),
        // serde_json already reports "at line N column M"
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
            message: format!("{format} parse error: {e}"),
            source: Some(Box::new(e)),
        }),
    }
}

fn toml_error(content: &str, e: toml::de::Error) -> ContractError {
    let location = e
        .span()
        .map(|span| {
            let (line, column) = line_column(content, span.start);
            format!(" at line {line}, column {column}")
        })
        .unwrap_or_default();
    ContractError::ConfigParse {
        message: format!("TOML parse error{location}: {}", e.message().trim_end()),
        source: Some(Box::new(e)),
    }
}

/// 1-based line and column of a byte offset
fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let before = &content[..offset.min(content.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

/// Re-root relative file paths onto `base` (the config file's directory).
///
/// Touches the replay recording and every file sink's `path`.
pub fn anchor_paths(blueprint: &mut DeviceBlueprint, base: &Path) {
    if let Some(path) = blueprint.source.path.as_mut() {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }

    for sink in &mut blueprint.sinks {
        if sink.sink_type != SinkType::File {
            continue;
        }
        if let Some(raw) = sink.params.get_mut("path") {
            if Path::new(raw.as_str()).is_relative() {
                *raw = base.join(raw.as_str()).display().to_string();
            }
        }
    }
}
