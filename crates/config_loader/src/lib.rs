//! # Config Loader
//!
//! Loads synchronizer configuration.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate stream keys, rates, window policy and the primary stream
//! - Generate `SyncBlueprint`
//! - Provide a built-in demo setup for simulation
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("Streams: {}", blueprint.streams.len());
//! ```

mod parser;
mod validator;

pub use contracts::SyncBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Built-in setup: one primary probe and two drifting secondaries
const DEMO_TOML: &str = r#"
version = "V1"

[sync]
window_length_ms = 1000.0
rate_tolerance = 0.01
primary = { source_id = 100, sub_stream_id = 0 }

[[streams]]
source_id = 100
sub_stream_id = 0
name = "probe-a"
expected_rate = 30000.0
sync_channel = 0

[[streams]]
source_id = 101
sub_stream_id = 0
name = "probe-b"
expected_rate = 30000.0
sync_channel = 0
simulated_rate = 30010.0

[[streams]]
source_id = 102
sub_stream_id = 0
name = "nidaq"
expected_rate = 2500.0
sync_channel = 1
simulated_rate = 2499.5
"#;

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
    pub fn load_from_path(path: &Path) -> Result<SyncBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SyncBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Built-in demo configuration
    pub fn demo() -> Result<SyncBlueprint, ContractError> {
        Self::load_from_str(DEMO_TOML, ConfigFormat::Toml)
    }

    /// Serialize SyncBlueprint to TOML string
    pub fn to_toml(blueprint: &SyncBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SyncBlueprint to JSON string
    pub fn to_json(blueprint: &SyncBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
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
    ) -> Result<SyncBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
