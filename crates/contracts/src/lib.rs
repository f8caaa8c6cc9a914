//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Canonical time is seconds (f64) on the primary stream's sample clock
//! - Raw positions are signed 64-bit sample indices local to each stream

mod blueprint;
mod converter;
mod error;
mod stream_key;
mod sync;

pub use blueprint::*;
pub use converter::TimestampConverter;
pub use error::*;
pub use stream_key::{ChannelIndex, SourceId, StreamKey, SubStreamId};
pub use sync::*;
