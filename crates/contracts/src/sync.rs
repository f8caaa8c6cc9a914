//! Synchronization status and window reports
//!
//! Output of the synchronizer's window cycle and per-stream diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChannelIndex, StreamKey};

/// Synchronization state of one stream.
///
/// The sole runtime signal of degraded alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No usable information yet (or no sync line configured)
    #[default]
    Off,
    /// Pulses observed, no fit currently accepted
    Syncing,
    /// Linear fit accepted within tolerance
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Off => "off",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one stream when its window closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowOutcome {
    /// Stream is the canonical clock; nothing to estimate
    Primary,
    /// No local pulse recorded (primary times alone are ignored)
    Empty,
    /// Local pulses recorded but they do not pair with the primary times
    Unpaired,
    /// Pairs recorded but the spanned interval is zero
    Degenerate,
    /// Fit accepted
    Fitted { rate: f64 },
    /// Fit outside tolerance, previous fit kept
    Rejected { rate: f64 },
}

impl WindowOutcome {
    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            WindowOutcome::Primary => "primary",
            WindowOutcome::Empty => "empty",
            WindowOutcome::Unpaired => "unpaired",
            WindowOutcome::Degenerate => "degenerate",
            WindowOutcome::Fitted { .. } => "fitted",
            WindowOutcome::Rejected { .. } => "rejected",
        }
    }

    /// Candidate rate computed in this window, accepted or not
    pub fn candidate_rate(&self) -> Option<f64> {
        match self {
            WindowOutcome::Fitted { rate } | WindowOutcome::Rejected { rate } => Some(*rate),
            _ => None,
        }
    }
}

/// Per-stream entry of a [`WindowReport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamWindowReport {
    pub stream: StreamKey,
    pub outcome: WindowOutcome,
    /// Status after the close
    pub status: SyncStatus,
    /// Rate used for conversion after the close
    pub estimated_rate: f64,
    pub expected_rate: f64,
}

/// Emitted every time the synchronizer closes a window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowReport {
    /// Sequence number of the closed window (starts at 1)
    pub window_index: u64,

    /// Canonical stream at close time
    pub primary: Option<StreamKey>,

    /// One entry per registered stream, ordered by key
    pub streams: Vec<StreamWindowReport>,
}

impl WindowReport {
    /// Entry for a given stream
    pub fn stream(&self, key: StreamKey) -> Option<&StreamWindowReport> {
        self.streams.iter().find(|s| s.stream == key)
    }

    /// Number of streams that ended the window synced
    pub fn synced_count(&self) -> usize {
        self.streams
            .iter()
            .filter(|s| s.status == SyncStatus::Synced)
            .count()
    }
}

/// Snapshot of one stream's synchronization state (for diagnostics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSyncInfo {
    pub stream: StreamKey,
    pub expected_rate: f64,
    pub estimated_rate: f64,
    pub status: SyncStatus,
    pub is_primary: bool,
    pub sync_channel: Option<ChannelIndex>,
    pub windows_evaluated: u64,
    pub pulses_recorded: u64,
    pub pulses_ignored: u64,
}

impl StreamSyncInfo {
    /// Deviation of the estimated rate from the declared one, in parts per million
    pub fn drift_ppm(&self) -> f64 {
        drift_ppm(self.estimated_rate, self.expected_rate)
    }
}

/// `(estimated - expected) / expected`, scaled to parts per million
pub fn drift_ppm(estimated_rate: f64, expected_rate: f64) -> f64 {
    if expected_rate == 0.0 {
        0.0
    } else {
        (estimated_rate - expected_rate) / expected_rate * 1e6
    }
}
