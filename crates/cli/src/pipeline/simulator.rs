//! Simulation orchestrator - wires synthetic streams, the synchronizer, the
//! window timer and the recorder together.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{StreamConfig, SyncBlueprint, TimestampConverter, WindowReport};
use observability::{record_samples_dropped, record_window_report, SyncMetricsAggregator};
use sync_engine::{Synchronizer, TimestampedRingBuffer, WindowTimerHandle};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::recorder::Recorder;
use super::source::SyntheticStream;
use super::SimulationStats;
use crate::error::CliError;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Streams and synchronizer settings
    pub blueprint: SyncBlueprint,

    /// Simulated acquisition time
    pub duration: Duration,

    /// Seconds between sync pulses
    pub pulse_interval: f64,

    /// Drift for secondary streams without an explicit `simulated_rate`
    pub drift_ppm: f64,

    /// Acquisition block period
    pub block: Duration,

    /// Window report queue capacity
    pub report_queue: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl SimulationConfig {
    /// Physical rate a stream runs at during the simulation
    pub fn actual_rate(&self, stream: &StreamConfig) -> f64 {
        if let Some(rate) = stream.simulated_rate {
            return rate;
        }
        if self.blueprint.sync.primary == Some(stream.key()) {
            stream.expected_rate
        } else {
            stream.expected_rate * (1.0 + self.drift_ppm * 1e-6)
        }
    }

    fn check(&self) -> Result<(), CliError> {
        if self.duration.is_zero() {
            return Err(CliError::invalid_parameter("duration", "must be > 0"));
        }
        if !self.pulse_interval.is_finite() || self.pulse_interval <= 0.0 {
            return Err(CliError::invalid_parameter(
                "pulse_interval",
                format!("must be > 0, got {}", self.pulse_interval),
            ));
        }
        if self.block.is_zero() {
            return Err(CliError::invalid_parameter("block_ms", "must be > 0"));
        }
        if !self.drift_ppm.is_finite() || self.drift_ppm.abs() >= 1e6 {
            return Err(CliError::invalid_parameter(
                "drift_ppm",
                format!("must be within (-1e6, 1e6), got {}", self.drift_ppm),
            ));
        }

        let primary = self.blueprint.sync.primary.ok_or(CliError::NoPrimary)?;
        let has_channel = self
            .blueprint
            .stream(primary)
            .is_some_and(|s| s.sync_channel.is_some());
        if !has_channel {
            return Err(CliError::PrimaryWithoutSyncChannel { stream: primary });
        }
        Ok(())
    }
}

/// Simulation runner
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Run until the configured duration elapses or `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<SimulationStats> {
        self.config.check()?;
        let start_time = Instant::now();
        let config = &self.config;
        let blueprint = &config.blueprint;

        // Initialize Metrics (optional)
        if let Some(port) = config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let window_secs = blueprint.sync.window_length_ms / 1000.0;
        if config.pulse_interval * 2.0 > window_secs {
            warn!(
                pulse_interval = config.pulse_interval,
                window_secs, "Fewer than two pulses per window - streams cannot synchronize"
            );
        }

        // Setup Synchronizer
        let sync = Arc::new(
            Synchronizer::from_blueprint(blueprint).context("Failed to configure synchronizer")?,
        );

        // Setup streams and recorder
        let primary = blueprint.sync.primary.ok_or(CliError::NoPrimary)?;
        let primary_scale = blueprint
            .stream(primary)
            .map_or(1.0, |s| config.actual_rate(s) / s.expected_rate);

        let converter: Arc<dyn TimestampConverter> = sync.clone();
        let mut recorder = Recorder::new(converter, primary_scale);
        let mut streams = Vec::with_capacity(blueprint.streams.len());
        for stream in &blueprint.streams {
            let actual_rate = config.actual_rate(stream);
            let (producer, consumer) =
                TimestampedRingBuffer::new(blueprint.sync.display_buffer_capacity).split();
            recorder.add_stream(stream.key(), consumer, actual_rate);
            streams.push(SyntheticStream::new(
                stream.key(),
                stream.sync_channel,
                actual_rate,
                producer,
            ));
            info!(
                stream = %stream.key(),
                name = %stream.label(),
                expected_rate = stream.expected_rate,
                actual_rate,
                "Synthetic stream configured"
            );
        }

        // Start reporter, recorder and window timer
        let (report_tx, report_rx) = mpsc::channel::<WindowReport>(config.report_queue.max(1));
        let reporter = tokio::spawn(report_worker(report_rx));

        let (stop_tx, stop_rx) = watch::channel(false);
        let recorder_task = tokio::spawn(recorder_worker(recorder, config.block, stop_rx));

        let timer = WindowTimerHandle::spawn(Arc::clone(&sync), Some(report_tx));

        info!(
            duration_secs = config.duration.as_secs_f64(),
            streams = streams.len(),
            "Simulation running"
        );

        // Acquisition loop
        let mut stats = SimulationStats::default();
        let mut ticker = tokio::time::interval(config.block);
        let acquisition_start = tokio::time::Instant::now();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping simulation...");
                    break;
                }
            }

            let elapsed = acquisition_start.elapsed().min(config.duration);
            let physical_time = elapsed.as_secs_f64();
            for stream in &mut streams {
                let output = stream.advance(physical_time, config.pulse_interval, &sync);
                stats.samples_produced += output.produced as u64;
                stats.samples_dropped += output.dropped as u64;
                stats.pulses_sent += output.pulses as u64;
                record_samples_dropped(stream.key(), output.dropped);
            }

            if elapsed >= config.duration {
                break;
            }
        }

        // Shutdown
        info!("Stopping simulation...");
        let timer_stats = timer.shutdown().await;

        let _ = stop_tx.send(true);
        stats.recorded = recorder_task.await.context("Recorder task panicked")?;
        let (sync_metrics, reports_received) =
            reporter.await.context("Reporter task panicked")?;

        stats.sync_metrics = sync_metrics;
        stats.windows_completed = timer_stats.windows_completed;
        stats.reports_dropped = timer_stats.reports_dropped;
        debug!(reports_received, "Reporter drained");
        stats.final_streams = sync.stream_infos();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            synced = stats.synced_streams(),
            "Simulation complete"
        );

        Ok(stats)
    }
}

/// Consumes window reports: metrics, aggregation, logging
async fn report_worker(mut rx: mpsc::Receiver<WindowReport>) -> (SyncMetricsAggregator, u64) {
    let mut aggregator = SyncMetricsAggregator::new();
    let mut received = 0;

    while let Some(report) = rx.recv().await {
        received += 1;
        record_window_report(&report);
        aggregator.update(&report);

        debug!(
            window_index = report.window_index,
            synced = report.synced_count(),
            streams = report.streams.len(),
            "Window report"
        );
    }

    (aggregator, received)
}

/// Drains stream buffers every block until stopped
async fn recorder_worker(
    mut recorder: Recorder,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> Vec<(contracts::StreamKey, super::recorder::RecordedStream)> {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                recorder.drain();
            }
            _ = stop_rx.changed() => break,
        }
    }
    recorder.finish()
}
