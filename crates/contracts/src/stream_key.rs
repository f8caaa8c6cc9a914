//! StreamKey - Composite data stream identity
//!
//! A stream is addressed by the processor that produces it (`source_id`) and
//! the index of the sub-stream within that processor (`sub_stream_id`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the processor that produced a stream.
pub type SourceId = u32;

/// Index of a sub-stream within its source.
pub type SubStreamId = u32;

/// Index of a digital (TTL) line within a stream.
pub type ChannelIndex = u32;

/// Flat registry key for one data stream.
///
/// `Copy` and hashable so the real-time path can look streams up without
/// allocating.
///
/// # Examples
/// ```
/// use contracts::StreamKey;
///
/// let key = StreamKey::new(100, 1);
/// assert_eq!(key.to_string(), "100.1");
/// assert_eq!(key, StreamKey::from((100, 1)));
/// ```
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StreamKey {
    pub source_id: SourceId,
    pub sub_stream_id: SubStreamId,
}

impl StreamKey {
    #[inline]
    pub const fn new(source_id: SourceId, sub_stream_id: SubStreamId) -> Self {
        Self {
            source_id,
            sub_stream_id,
        }
    }
}

impl From<(SourceId, SubStreamId)> for StreamKey {
    #[inline]
    fn from((source_id, sub_stream_id): (SourceId, SubStreamId)) -> Self {
        Self::new(source_id, sub_stream_id)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source_id, self.sub_stream_id)
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamKey({}.{})", self.source_id, self.sub_stream_id)
    }
}
