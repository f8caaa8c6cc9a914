//! # Sync Engine
//!
//! 多数据流采样时钟同步引擎。
//!
//! 负责：
//! - 按 (source, sub-stream) 注册数据流，指定主时钟
//! - 接收同步脉冲，按窗口估计每个数据流的实际采样率
//! - 将采样序号换算为主时钟的规范时间
//! - 定时驱动窗口开闭 (`WindowTimerHandle`)
//!
//! ## 使用示例
//!
//! ```ignore
//! use contracts::StreamKey;
//! use sync_engine::Synchronizer;
//!
//! let sync = Synchronizer::new(1000.0, 0.01);
//! sync.add_data_stream(StreamKey::new(100, 0), 30000.0)?;
//! sync.add_data_stream(StreamKey::new(101, 0), 30000.0)?;
//! sync.set_sync_bit(StreamKey::new(100, 0), 0)?;
//! sync.set_sync_bit(StreamKey::new(101, 0), 0)?;
//! sync.set_primary_data_stream(StreamKey::new(100, 0));
//!
//! sync.open_sync_window();
//! // Real-time path
//! sync.add_event(101, 0, 0, sample_number);
//! // Timer path
//! let report = sync.advance_window();
//! // Recorder path
//! let t = sync.convert_timestamp(101, 0, sample_number);
//! ```

mod buffer;
mod clock;
mod engine;
mod timer;
mod window;

pub use buffer::{TimestampConsumer, TimestampProducer, TimestampedRingBuffer, TimestampedSample};
pub use clock::{ClockSnapshot, ClosedWindow, StreamClock};
pub use engine::Synchronizer;
pub use timer::{TimerStats, WindowTimerHandle};
pub use window::{fit_window, next_status, within_tolerance, LinearFit, WindowBounds};

// Re-export contracts types
pub use contracts::{
    StreamKey, StreamSyncInfo, StreamWindowReport, SyncStatus, TimestampConverter,
    WindowOutcome, WindowReport,
};
