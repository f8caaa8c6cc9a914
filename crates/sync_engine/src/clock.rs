//! Per-stream synchronization state.
//!
//! Two pieces of state with different owners:
//! - the in-progress window accumulator, written by the real-time pulse path
//!   under a short mutex
//! - the published [`ClockSnapshot`], replaced as a whole by window close and
//!   reset and read lock-free by conversion
//!
//! Snapshots are only stored while the window mutex is held, so a reset and a
//! close can never interleave their publications.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use contracts::{ChannelIndex, StreamKey, SyncStatus, WindowOutcome};
use parking_lot::Mutex;

use crate::window::{fit_window, next_status, LinearFit, WindowBounds};

/// Outside the channel range so every `ChannelIndex` stays assignable
const NO_SYNC_CHANNEL: u64 = u64::MAX;

/// Immutable view of a clock's alignment, swapped atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSnapshot {
    /// Incremented on every publication
    pub generation: u64,
    pub status: SyncStatus,
    pub is_primary: bool,
    pub expected_rate: f64,
    /// Last accepted fit; `None` until the first accepted window
    pub fit: Option<LinearFit>,
    pub windows_evaluated: u64,
    /// Most recent candidate rate that failed the tolerance check
    pub last_rejected_rate: Option<f64>,
}

impl ClockSnapshot {
    fn initial(expected_rate: f64, is_primary: bool, generation: u64) -> Self {
        Self {
            generation,
            status: if is_primary {
                SyncStatus::Synced
            } else {
                SyncStatus::Off
            },
            is_primary,
            expected_rate,
            fit: is_primary.then(|| LinearFit::anchored_at_zero(expected_rate)),
            windows_evaluated: 0,
            last_rejected_rate: None,
        }
    }

    pub fn estimated_rate(&self) -> f64 {
        self.fit.map_or(self.expected_rate, |fit| fit.rate)
    }

    /// Canonical time of `sample_number`.
    ///
    /// Without an accepted fit this is `sample / expected_rate`, with no offset
    /// correction.
    #[inline]
    pub fn time_at(&self, sample_number: i64) -> f64 {
        match self.fit {
            Some(fit) => fit.time_at(sample_number),
            None => sample_number as f64 / self.expected_rate,
        }
    }
}

/// Result of closing one clock's window
#[derive(Debug, Clone)]
pub struct ClosedWindow {
    pub outcome: WindowOutcome,
    pub previous_status: SyncStatus,
    pub bounds: WindowBounds,
    pub snapshot: Arc<ClockSnapshot>,
}

#[derive(Debug, Default)]
struct WindowState {
    open: bool,
    current: WindowBounds,
    last_closed: Option<WindowBounds>,
}

/// Synchronization state machine for one data stream.
pub struct StreamClock {
    key: StreamKey,
    expected_rate: f64,
    rate_tolerance: f64,
    sync_channel: AtomicU64,
    window: Mutex<WindowState>,
    snapshot: ArcSwap<ClockSnapshot>,
    pulses_recorded: AtomicU64,
    pulses_ignored: AtomicU64,
}

impl fmt::Debug for StreamClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("StreamClock")
            .field("key", &self.key)
            .field("expected_rate", &self.expected_rate)
            .field("estimated_rate", &snapshot.estimated_rate())
            .field("status", &snapshot.status)
            .field("sync_channel", &self.sync_channel())
            .finish()
    }
}

impl StreamClock {
    /// Create a clock in `Off` state.
    ///
    /// `expected_rate` must be finite and positive; the synchronizer checks
    /// this before registering.
    pub fn new(key: StreamKey, expected_rate: f64, rate_tolerance: f64) -> Self {
        Self {
            key,
            expected_rate,
            rate_tolerance,
            sync_channel: AtomicU64::new(NO_SYNC_CHANNEL),
            window: Mutex::new(WindowState::default()),
            snapshot: ArcSwap::from_pointee(ClockSnapshot::initial(expected_rate, false, 0)),
            pulses_recorded: AtomicU64::new(0),
            pulses_ignored: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn key(&self) -> StreamKey {
        self.key
    }

    #[inline]
    pub fn expected_rate(&self) -> f64 {
        self.expected_rate
    }

    #[inline]
    pub fn rate_tolerance(&self) -> f64 {
        self.rate_tolerance
    }

    pub fn sync_channel(&self) -> Option<ChannelIndex> {
        ChannelIndex::try_from(self.sync_channel.load(Ordering::Acquire)).ok()
    }

    pub fn set_sync_channel(&self, channel: Option<ChannelIndex>) {
        self.sync_channel
            .store(channel.map_or(NO_SYNC_CHANNEL, u64::from), Ordering::Release);
    }

    /// Current published snapshot
    #[inline]
    pub fn snapshot(&self) -> Arc<ClockSnapshot> {
        self.snapshot.load_full()
    }

    pub fn status(&self) -> SyncStatus {
        self.snapshot.load().status
    }

    pub fn estimated_rate(&self) -> f64 {
        self.snapshot.load().estimated_rate()
    }

    pub fn is_primary(&self) -> bool {
        self.snapshot.load().is_primary
    }

    #[inline]
    pub fn convert_timestamp(&self, sample_number: i64) -> f64 {
        self.snapshot.load().time_at(sample_number)
    }

    pub fn is_window_open(&self) -> bool {
        self.window.lock().open
    }

    /// Bounds of the in-progress window, or of the most recently closed one
    pub fn window_bounds(&self) -> WindowBounds {
        let window = self.window.lock();
        if window.open {
            window.current
        } else {
            window.last_closed.unwrap_or_default()
        }
    }

    pub fn pulses_recorded(&self) -> u64 {
        self.pulses_recorded.load(Ordering::Relaxed)
    }

    pub fn pulses_ignored(&self) -> u64 {
        self.pulses_ignored.load(Ordering::Relaxed)
    }

    pub(crate) fn note_ignored_pulse(&self) {
        self.pulses_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sync pulse at `sample_number`.
    ///
    /// Returns `false` (pulse dropped) when no window is open.
    #[inline]
    pub fn add_event(&self, sample_number: i64) -> bool {
        let recorded = {
            let mut window = self.window.lock();
            if window.open {
                window.current.record_pulse(sample_number);
            }
            window.open
        };
        if recorded {
            self.pulses_recorded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.note_ignored_pulse();
        }
        recorded
    }

    /// Bind the primary's canonical time of its latest pulse to this window.
    #[inline]
    pub fn set_primary_time(&self, time: f64) -> bool {
        let mut window = self.window.lock();
        if window.open {
            window.current.record_primary_time(time);
        }
        window.open
    }

    pub fn open_sync_window(&self) {
        let mut window = self.window.lock();
        window.open = true;
        window.current = WindowBounds::default();
    }

    /// Close the window and re-estimate the rate.
    ///
    /// Returns `None` if no window was open.
    pub fn close_sync_window(&self) -> Option<ClosedWindow> {
        let mut window = self.window.lock();
        if !window.open {
            return None;
        }
        window.open = false;
        let bounds = std::mem::take(&mut window.current);
        window.last_closed = Some(bounds);

        let previous = self.snapshot.load_full();
        let (outcome, fit) = if previous.is_primary {
            (WindowOutcome::Primary, previous.fit)
        } else {
            let (outcome, accepted) = fit_window(&bounds, self.expected_rate, self.rate_tolerance);
            (outcome, accepted.or(previous.fit))
        };

        let next = ClockSnapshot {
            generation: previous.generation + 1,
            status: next_status(previous.status, previous.fit.is_some(), &outcome),
            is_primary: previous.is_primary,
            expected_rate: self.expected_rate,
            fit,
            windows_evaluated: previous.windows_evaluated + 1,
            last_rejected_rate: match outcome {
                WindowOutcome::Rejected { rate } => Some(rate),
                _ => previous.last_rejected_rate,
            },
        };
        let snapshot = Arc::new(next);
        self.snapshot.store(Arc::clone(&snapshot));
        drop(window);

        Some(ClosedWindow {
            outcome,
            previous_status: previous.status,
            bounds,
            snapshot,
        })
    }

    /// Clear window bounds and return to `Off` at the expected rate.
    ///
    /// The window stays open if it was open; accumulation restarts from empty.
    pub fn reset(&self) {
        let is_primary = self.is_primary();
        self.reset_with_role(is_primary);
    }

    /// Reset and (re)assign the canonical-clock role.
    pub(crate) fn reset_with_role(&self, is_primary: bool) {
        let mut window = self.window.lock();
        window.current = WindowBounds::default();
        window.last_closed = None;
        let generation = self.snapshot.load().generation + 1;
        self.snapshot.store(Arc::new(ClockSnapshot::initial(
            self.expected_rate,
            is_primary,
            generation,
        )));
    }
}
