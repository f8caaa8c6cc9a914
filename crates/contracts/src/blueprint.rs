//! SyncBlueprint - Config Loader output
//!
//! Describes a full synchronizer setup: window policy, canonical stream and the
//! streams to register.

use serde::{Deserialize, Serialize};

use crate::{ChannelIndex, StreamKey};

/// Default window length in milliseconds
pub const DEFAULT_WINDOW_LENGTH_MS: f64 = 2000.0;

/// Default accepted fractional deviation between estimated and expected rate
pub const DEFAULT_RATE_TOLERANCE: f64 = 0.01;

/// Default capacity of per-stream display buffers
pub const DEFAULT_DISPLAY_BUFFER_CAPACITY: usize = 4096;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Window and tolerance policy
    #[serde(default)]
    pub sync: SyncSettings,

    /// Streams to register
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

impl SyncBlueprint {
    /// Look up a stream definition by key
    pub fn stream(&self, key: StreamKey) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.key() == key)
    }
}

/// Synchronizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Length of one estimation window (milliseconds)
    #[serde(default = "default_window_length_ms")]
    pub window_length_ms: f64,

    /// Maximum `|estimated - expected| / expected` accepted as a fit
    #[serde(default = "default_rate_tolerance")]
    pub rate_tolerance: f64,

    /// Canonical clock
    #[serde(default)]
    pub primary: Option<StreamKey>,

    /// Capacity of the timestamped display buffer kept per stream
    #[serde(default = "default_display_buffer_capacity")]
    pub display_buffer_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            window_length_ms: DEFAULT_WINDOW_LENGTH_MS,
            rate_tolerance: DEFAULT_RATE_TOLERANCE,
            primary: None,
            display_buffer_capacity: DEFAULT_DISPLAY_BUFFER_CAPACITY,
        }
    }
}

fn default_window_length_ms() -> f64 {
    DEFAULT_WINDOW_LENGTH_MS
}

fn default_rate_tolerance() -> f64 {
    DEFAULT_RATE_TOLERANCE
}

fn default_display_buffer_capacity() -> usize {
    DEFAULT_DISPLAY_BUFFER_CAPACITY
}

/// One data stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub source_id: u32,

    pub sub_stream_id: u32,

    /// Human readable label
    #[serde(default)]
    pub name: Option<String>,

    /// Nominal sample rate declared by the hardware (Hz), must be > 0
    pub expected_rate: f64,

    /// Digital line carrying sync pulses
    #[serde(default)]
    pub sync_channel: Option<ChannelIndex>,

    /// Physical rate used by the `simulate` command (Hz)
    #[serde(default)]
    pub simulated_rate: Option<f64>,
}

impl StreamConfig {
    pub fn key(&self) -> StreamKey {
        StreamKey::new(self.source_id, self.sub_stream_id)
    }

    /// Name if configured, otherwise the key
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.key().to_string())
    }
}
