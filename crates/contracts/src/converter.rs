//! TimestampConverter trait - writer-facing interface
//!
//! Storage writers depend on this trait rather than on the synchronizer type.

use crate::{StreamKey, SyncStatus};

/// Maps raw stream sample indices onto canonical recording time.
///
/// Implementations never fail: unsynchronized or unknown streams yield a
/// best-effort value and report it through [`TimestampConverter::status`].
pub trait TimestampConverter: Send + Sync {
    /// Canonical time (seconds) for `sample_number` of `stream`
    fn convert_timestamp(&self, stream: StreamKey, sample_number: i64) -> f64;

    /// Current synchronization status of `stream`
    fn status(&self, stream: StreamKey) -> SyncStatus;

    /// Whether timestamps for `stream` are currently backed by an accepted fit.
    ///
    /// Writers use this to mark segments as provisional.
    fn is_synced(&self, stream: StreamKey) -> bool {
        self.status(stream) == SyncStatus::Synced
    }
}
