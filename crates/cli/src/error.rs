//! Error types for CLI operations.

use std::path::Path;

use contracts::StreamKey;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Simulation needs a canonical clock
    #[error("No primary stream configured; set sync.primary")]
    NoPrimary,

    /// Primary stream cannot receive pulses
    #[error("Primary stream {stream} has no sync_channel")]
    PrimaryWithoutSyncChannel { stream: StreamKey },

    /// Simulation parameter out of range
    #[error("Invalid simulation parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CliError::config_not_found(Path::new("missing.toml"));
        assert_eq!(err.to_string(), "Configuration file not found: missing.toml");

        let err = CliError::invalid_parameter("duration", "must be > 0");
        assert!(err.to_string().contains("'duration'"));
    }
}
