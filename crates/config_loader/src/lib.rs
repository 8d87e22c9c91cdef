//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `DeviceBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("pedometer.toml")).unwrap();
//! println!("Detector: {}", blueprint.detector.kind);
//! ```

mod parser;
pub mod validator;

pub use contracts::DeviceBlueprint;
pub use parser::ConfigFormat;
pub use validator::MAX_RADIO_CHUNK_SIZE;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    ///
    /// Relative replay and session paths are resolved against the
    /// directory the file lives in.
    pub fn load_from_path(path: &Path) -> Result<DeviceBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let mut blueprint = parser::parse(&content, format)?;
        if let Some(base) = path.parent() {
            parser::anchor_paths(&mut blueprint, base);
        }
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<DeviceBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Parse without validating (for tooling that reports issues itself)
    pub fn parse_str(content: &str, format: ConfigFormat) -> Result<DeviceBlueprint, ContractError> {
        parser::parse(content, format)
    }

    /// Validate an already-parsed blueprint
    pub fn validate(blueprint: &DeviceBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize DeviceBlueprint to TOML string
    pub fn to_toml(blueprint: &DeviceBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize DeviceBlueprint to JSON string
    pub fn to_json(blueprint: &DeviceBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    pub fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<DeviceBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
