//! Layered error definitions
//!
//! Categorized by source: config / registration / io.
//! Nothing on the real-time pulse path or the conversion path returns these.

use thiserror::Error;

use crate::StreamKey;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Registration Errors =====
    /// Declared sample rate cannot drive a clock
    #[error("invalid sample rate for stream {stream}: {rate}")]
    InvalidSampleRate { stream: StreamKey, rate: f64 },

    /// Operation requires a registered stream
    #[error("stream {stream} is not registered")]
    StreamNotRegistered { stream: StreamKey },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid sample rate error
    pub fn invalid_sample_rate(stream: StreamKey, rate: f64) -> Self {
        Self::InvalidSampleRate { stream, rate }
    }
}
