//! Main synchronizer implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use contracts::{
    ChannelIndex, ContractError, SourceId, StreamKey, StreamSyncInfo, StreamWindowReport,
    SubStreamId, SyncBlueprint, SyncSettings, SyncStatus, TimestampConverter, WindowOutcome,
    WindowReport, DEFAULT_RATE_TOLERANCE, DEFAULT_WINDOW_LENGTH_MS,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::clock::{ClockSnapshot, ClosedWindow, StreamClock};
use crate::window::WindowBounds;

const MIN_WINDOW_LENGTH_MS: f64 = 1.0;

/// Shape of the stream registry; replaced as a whole on configuration changes
#[derive(Debug, Default)]
struct Registry {
    clocks: HashMap<StreamKey, Arc<StreamClock>>,
    primary: Option<StreamKey>,
}

impl Registry {
    fn with_clocks(&self, clocks: HashMap<StreamKey, Arc<StreamClock>>) -> Self {
        Self {
            clocks,
            primary: self.primary,
        }
    }
}

/// Multi-stream sample-clock synchronizer
///
/// Three call sites share one instance:
/// - the real-time path calls [`Synchronizer::add_event`]
/// - the window timer calls [`Synchronizer::advance_window`]
/// - recorders call [`Synchronizer::convert_timestamp`]
///
/// Configuration calls (`add_data_stream`, `set_primary_data_stream`, ...)
/// rebuild the registry copy-on-write; the other paths only load it.
#[derive(Debug)]
pub struct Synchronizer {
    registry: ArcSwap<Registry>,
    /// Serializes registry writers
    config_lock: Mutex<()>,
    window_length_ms: f64,
    rate_tolerance: f64,
    window_open: AtomicBool,
    windows_closed: AtomicU64,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_LENGTH_MS, DEFAULT_RATE_TOLERANCE)
    }
}

impl Synchronizer {
    /// Create a synchronizer with no streams.
    ///
    /// `window_length_ms` is clamped to at least 1 ms.
    pub fn new(window_length_ms: f64, rate_tolerance: f64) -> Self {
        let window_length_ms = if window_length_ms.is_finite() {
            window_length_ms.max(MIN_WINDOW_LENGTH_MS)
        } else {
            DEFAULT_WINDOW_LENGTH_MS
        };
        Self {
            registry: ArcSwap::from_pointee(Registry::default()),
            config_lock: Mutex::new(()),
            window_length_ms,
            rate_tolerance,
            window_open: AtomicBool::new(false),
            windows_closed: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.window_length_ms, settings.rate_tolerance)
    }

    /// Build a synchronizer with every stream, sync line and the primary from
    /// a validated blueprint.
    #[instrument(name = "synchronizer_from_blueprint", skip(blueprint), fields(streams = blueprint.streams.len()))]
    pub fn from_blueprint(blueprint: &SyncBlueprint) -> Result<Self, ContractError> {
        let sync = Self::from_settings(&blueprint.sync);
        for stream in &blueprint.streams {
            let key = stream.key();
            sync.add_data_stream(key, stream.expected_rate)?;
            if let Some(channel) = stream.sync_channel {
                sync.set_sync_bit(key, channel)?;
            }
        }
        if let Some(primary) = blueprint.sync.primary {
            if !sync.set_primary_data_stream(primary) {
                return Err(ContractError::StreamNotRegistered { stream: primary });
            }
        }
        Ok(sync)
    }

    // ===== Configuration =====

    /// Register a stream in `Off` state.
    ///
    /// Re-registering replaces the clock and drops its fit; the configured
    /// sync line is kept. Re-registering the primary also resets every other
    /// clock, since canonical time changed.
    #[instrument(name = "synchronizer_add_stream", skip(self), fields(stream = %key))]
    pub fn add_data_stream(
        &self,
        key: StreamKey,
        expected_sample_rate: f64,
    ) -> Result<(), ContractError> {
        if !expected_sample_rate.is_finite() || expected_sample_rate <= 0.0 {
            return Err(ContractError::invalid_sample_rate(key, expected_sample_rate));
        }

        let _guard = self.config_lock.lock();
        let current = self.registry.load_full();

        let clock = StreamClock::new(key, expected_sample_rate, self.rate_tolerance);
        let replaced = current.clocks.get(&key);
        if let Some(previous) = replaced {
            clock.set_sync_channel(previous.sync_channel());
        }
        let is_primary = current.primary == Some(key);
        if is_primary {
            clock.reset_with_role(true);
        }
        if self.window_open.load(Ordering::Acquire) {
            clock.open_sync_window();
        }

        let mut clocks = current.clocks.clone();
        clocks.insert(key, Arc::new(clock));
        let next = current.with_clocks(clocks);

        if is_primary && replaced.is_some() {
            for (other_key, other) in &next.clocks {
                if *other_key != key {
                    other.reset_with_role(false);
                }
            }
        }
        self.registry.store(Arc::new(next));

        info!(
            stream = %key,
            expected_rate = expected_sample_rate,
            replaced = replaced.is_some(),
            "Data stream registered"
        );
        Ok(())
    }

    /// Deregister a stream. Removing the primary leaves the synchronizer
    /// unavailable and resets the remaining clocks.
    #[instrument(name = "synchronizer_remove_stream", skip(self))]
    pub fn remove_data_stream(&self, stream: StreamKey) -> bool {
        let _guard = self.config_lock.lock();
        let current = self.registry.load_full();
        if !current.clocks.contains_key(&stream) {
            return false;
        }

        let mut clocks = current.clocks.clone();
        clocks.remove(&stream);
        let lost_primary = current.primary == Some(stream);
        let next = Registry {
            clocks,
            primary: if lost_primary { None } else { current.primary },
        };
        if lost_primary {
            for clock in next.clocks.values() {
                clock.reset_with_role(false);
            }
        }
        self.registry.store(Arc::new(next));

        info!(stream = %stream, lost_primary, "Data stream removed");
        true
    }

    /// Designate the canonical clock and reset every stream.
    ///
    /// No-op (returns `false`) if the stream is not registered.
    #[instrument(name = "synchronizer_set_primary", skip(self))]
    pub fn set_primary_data_stream(&self, stream: StreamKey) -> bool {
        let _guard = self.config_lock.lock();
        let current = self.registry.load_full();
        if !current.clocks.contains_key(&stream) {
            warn!(stream = %stream, "Cannot set primary: stream not registered");
            return false;
        }

        let next = Registry {
            clocks: current.clocks.clone(),
            primary: Some(stream),
        };
        for (key, clock) in &next.clocks {
            clock.reset_with_role(*key == stream);
        }
        self.registry.store(Arc::new(next));

        info!(stream = %stream, previous = ?current.primary, "Primary data stream set");
        true
    }

    pub fn set_sync_bit(
        &self,
        stream: StreamKey,
        channel: ChannelIndex,
    ) -> Result<(), ContractError> {
        let clock = self
            .clock(stream)
            .ok_or(ContractError::StreamNotRegistered { stream })?;
        clock.set_sync_channel(Some(channel));
        debug!(stream = %stream, channel, "Sync bit set");
        Ok(())
    }

    pub fn clear_sync_bit(&self, stream: StreamKey) {
        if let Some(clock) = self.clock(stream) {
            clock.set_sync_channel(None);
        }
    }

    pub fn get_sync_bit(&self, stream: StreamKey) -> Option<ChannelIndex> {
        self.clock(stream).and_then(|clock| clock.sync_channel())
    }

    /// Reset every clock, keeping registrations and the primary.
    #[instrument(name = "synchronizer_reset", skip(self))]
    pub fn reset(&self) {
        let registry = self.registry.load();
        for (key, clock) in &registry.clocks {
            clock.reset_with_role(registry.primary == Some(*key));
        }
        info!(streams = registry.clocks.len(), "Synchronizer reset");
    }

    // ===== Real-time path =====

    /// Ingest a digital line transition.
    ///
    /// Ignored unless `ttl_channel` is the stream's sync line. A pulse on the
    /// primary additionally binds the primary's canonical time to every other
    /// stream's open window. Returns whether the pulse was recorded.
    #[inline]
    pub fn add_event(
        &self,
        source_id: SourceId,
        sub_stream_id: SubStreamId,
        ttl_channel: ChannelIndex,
        sample_number: i64,
    ) -> bool {
        let registry = self.registry.load();
        if registry.clocks.len() < 2 {
            return false;
        }

        let key = StreamKey::new(source_id, sub_stream_id);
        let Some(clock) = registry.clocks.get(&key) else {
            return false;
        };
        if clock.sync_channel() != Some(ttl_channel) {
            clock.note_ignored_pulse();
            return false;
        }

        let recorded = clock.add_event(sample_number);

        if registry.primary == Some(key) {
            let primary_time = clock.convert_timestamp(sample_number);
            for (other_key, other) in registry.clocks.iter() {
                if *other_key != key {
                    other.set_primary_time(primary_time);
                }
            }
        }

        recorded
    }

    // ===== Conversion =====

    /// Map a raw sample index of a stream to canonical time (seconds).
    ///
    /// Reads one snapshot, so the reference point and rate always belong to
    /// the same fit. Streams without an accepted fit fall back to
    /// `sample / expected_rate`; unregistered streams fall back to the
    /// primary's nominal rate, or the raw sample count without a primary.
    pub fn convert_timestamp(
        &self,
        source_id: SourceId,
        sub_stream_id: SubStreamId,
        sample_number: i64,
    ) -> f64 {
        let key = StreamKey::new(source_id, sub_stream_id);
        let registry = self.registry.load();
        if let Some(clock) = registry.clocks.get(&key) {
            return clock.convert_timestamp(sample_number);
        }

        trace!(stream = %key, "Converting timestamp for unregistered stream");
        registry
            .primary
            .and_then(|primary| registry.clocks.get(&primary))
            .map_or(sample_number as f64, |primary| {
                sample_number as f64 / primary.expected_rate()
            })
    }

    /// Conversion that refuses unregistered streams
    pub fn try_convert_timestamp(&self, stream: StreamKey, sample_number: i64) -> Option<f64> {
        self.clock(stream)
            .map(|clock| clock.convert_timestamp(sample_number))
    }

    pub fn get_status(&self, source_id: SourceId, sub_stream_id: SubStreamId) -> SyncStatus {
        let Some(clock) = self.clock(StreamKey::new(source_id, sub_stream_id)) else {
            return SyncStatus::Off;
        };
        let snapshot = clock.snapshot();
        if snapshot.is_primary {
            SyncStatus::Synced
        } else if clock.sync_channel().is_none() {
            SyncStatus::Off
        } else {
            snapshot.status
        }
    }

    pub fn is_subprocessor_synced(&self, source_id: SourceId, sub_stream_id: SubStreamId) -> bool {
        self.get_status(source_id, sub_stream_id) == SyncStatus::Synced
    }

    /// True iff a primary stream is designated
    pub fn is_available(&self) -> bool {
        self.registry.load().primary.is_some()
    }

    // ===== Window management =====

    /// Open a window on every registered stream
    #[instrument(name = "synchronizer_open_window", level = "debug", skip(self))]
    pub fn open_sync_window(&self) {
        self.window_open.store(true, Ordering::Release);
        let registry = self.registry.load();
        for clock in registry.clocks.values() {
            clock.open_sync_window();
        }
    }

    /// Close the open window on every stream and re-estimate rates.
    ///
    /// Returns an empty report (same index as the last one) if no window was
    /// open.
    #[instrument(name = "synchronizer_close_window", level = "debug", skip(self))]
    pub fn close_sync_window(&self) -> WindowReport {
        let registry = self.registry.load();
        if !self.window_open.swap(false, Ordering::AcqRel) {
            return WindowReport {
                window_index: self.windows_closed.load(Ordering::Acquire),
                primary: registry.primary,
                streams: Vec::new(),
            };
        }
        let window_index = self.windows_closed.fetch_add(1, Ordering::AcqRel) + 1;

        let mut streams = Vec::with_capacity(registry.clocks.len());
        for (key, clock) in &registry.clocks {
            if let Some(closed) = clock.close_sync_window() {
                record_window_close(*key, &closed);
                streams.push(StreamWindowReport {
                    stream: *key,
                    outcome: closed.outcome,
                    status: closed.snapshot.status,
                    estimated_rate: closed.snapshot.estimated_rate(),
                    expected_rate: clock.expected_rate(),
                });
            }
        }
        streams.sort_by_key(|s| s.stream);

        debug!(
            window_index,
            streams = streams.len(),
            synced = streams
                .iter()
                .filter(|s| s.status == SyncStatus::Synced)
                .count(),
            "Sync window closed"
        );

        WindowReport {
            window_index,
            primary: registry.primary,
            streams,
        }
    }

    /// Close the current window and immediately open the next one.
    pub fn advance_window(&self) -> WindowReport {
        let report = self.close_sync_window();
        self.open_sync_window();
        report
    }

    pub fn is_window_open(&self) -> bool {
        self.window_open.load(Ordering::Acquire)
    }

    // ===== Diagnostics =====

    pub fn window_length(&self) -> Duration {
        Duration::from_secs_f64(self.window_length_ms / 1000.0)
    }

    pub fn window_length_ms(&self) -> f64 {
        self.window_length_ms
    }

    pub fn rate_tolerance(&self) -> f64 {
        self.rate_tolerance
    }

    pub fn primary_stream(&self) -> Option<StreamKey> {
        self.registry.load().primary
    }

    pub fn stream_count(&self) -> usize {
        self.registry.load().clocks.len()
    }

    /// Number of windows closed so far
    pub fn windows_closed(&self) -> u64 {
        self.windows_closed.load(Ordering::Acquire)
    }

    /// Published alignment of one stream
    pub fn clock_snapshot(&self, stream: StreamKey) -> Option<Arc<ClockSnapshot>> {
        self.clock(stream).map(|clock| clock.snapshot())
    }

    /// In-progress (or last closed) window bounds of one stream
    pub fn window_bounds(&self, stream: StreamKey) -> Option<WindowBounds> {
        self.clock(stream).map(|clock| clock.window_bounds())
    }

    /// Per-stream status, ordered by key
    pub fn stream_infos(&self) -> Vec<StreamSyncInfo> {
        let registry = self.registry.load();
        let mut infos: Vec<_> = registry
            .clocks
            .iter()
            .map(|(key, clock)| {
                let snapshot = clock.snapshot();
                StreamSyncInfo {
                    stream: *key,
                    expected_rate: clock.expected_rate(),
                    estimated_rate: snapshot.estimated_rate(),
                    status: self.get_status(key.source_id, key.sub_stream_id),
                    is_primary: snapshot.is_primary,
                    sync_channel: clock.sync_channel(),
                    windows_evaluated: snapshot.windows_evaluated,
                    pulses_recorded: clock.pulses_recorded(),
                    pulses_ignored: clock.pulses_ignored(),
                }
            })
            .collect();
        infos.sort_by_key(|info| info.stream);
        infos
    }

    fn clock(&self, stream: StreamKey) -> Option<Arc<StreamClock>> {
        self.registry.load().clocks.get(&stream).cloned()
    }
}

impl TimestampConverter for Synchronizer {
    fn convert_timestamp(&self, stream: StreamKey, sample_number: i64) -> f64 {
        Synchronizer::convert_timestamp(self, stream.source_id, stream.sub_stream_id, sample_number)
    }

    fn status(&self, stream: StreamKey) -> SyncStatus {
        self.get_status(stream.source_id, stream.sub_stream_id)
    }
}

fn record_window_close(key: StreamKey, closed: &ClosedWindow) {
    metrics::counter!(
        "clocksync_window_outcomes_total",
        "outcome" => closed.outcome.label()
    )
    .increment(1);

    let status = closed.snapshot.status;
    match closed.outcome {
        WindowOutcome::Rejected { rate } => warn!(
            stream = %key,
            rate,
            expected_rate = closed.snapshot.expected_rate,
            "Rate estimate outside tolerance, keeping previous fit"
        ),
        WindowOutcome::Fitted { rate } if closed.previous_status != SyncStatus::Synced => info!(
            stream = %key,
            rate,
            "Stream synchronized"
        ),
        _ if closed.previous_status == SyncStatus::Synced && status != SyncStatus::Synced => {
            warn!(stream = %key, outcome = closed.outcome.label(), "Stream lost synchronization")
        }
        _ => trace!(
            stream = %key,
            outcome = closed.outcome.label(),
            pulses = closed.bounds.pulse_count,
            primary_times = closed.bounds.primary_time_count,
            "Window evaluated"
        ),
    }
}
