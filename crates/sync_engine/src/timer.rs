//! WindowTimer - drives periodic window evaluation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::WindowReport;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, warn};

use crate::engine::Synchronizer;

/// Counters of a window timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub windows_completed: u64,
    pub reports_dropped: u64,
}

#[derive(Debug, Default)]
struct TimerCounters {
    windows_completed: AtomicU64,
    reports_dropped: AtomicU64,
}

impl TimerCounters {
    fn stats(&self) -> TimerStats {
        TimerStats {
            windows_completed: self.windows_completed.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running window timer task
pub struct WindowTimerHandle {
    counters: Arc<TimerCounters>,
    shutdown_tx: oneshot::Sender<()>,
    worker_handle: JoinHandle<()>,
}

impl WindowTimerHandle {
    /// Open the first window and spawn the timer task.
    ///
    /// Every `window_length` the current window is closed and the next one
    /// opened. Reports go to `reports` without waiting; a full channel drops
    /// the report.
    pub fn spawn(sync: Arc<Synchronizer>, reports: Option<mpsc::Sender<WindowReport>>) -> Self {
        let counters = Arc::new(TimerCounters::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        sync.open_sync_window();

        let worker_counters = Arc::clone(&counters);
        let worker_handle = tokio::spawn(async move {
            timer_worker(sync, reports, worker_counters, shutdown_rx).await;
        });

        Self {
            counters,
            shutdown_tx,
            worker_handle,
        }
    }

    /// Windows closed by this timer so far
    pub fn windows_completed(&self) -> u64 {
        self.counters.windows_completed.load(Ordering::Relaxed)
    }

    /// Reports dropped because the receiver lagged or was gone
    pub fn reports_dropped(&self) -> u64 {
        self.counters.reports_dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> TimerStats {
        self.counters.stats()
    }

    /// Stop the timer, closing the final window.
    #[instrument(name = "window_timer_shutdown", skip(self))]
    pub async fn shutdown(self) -> TimerStats {
        let Self {
            counters,
            shutdown_tx,
            worker_handle,
        } = self;

        // Worker may already be gone; nothing to signal then
        let _ = shutdown_tx.send(());
        if let Err(e) = worker_handle.await {
            error!(error = ?e, "Window timer task panicked");
        }
        let stats = counters.stats();
        debug!(
            windows = stats.windows_completed,
            dropped = stats.reports_dropped,
            "WindowTimer shutdown complete"
        );
        stats
    }
}

#[instrument(name = "window_timer_loop", skip_all)]
async fn timer_worker(
    sync: Arc<Synchronizer>,
    reports: Option<mpsc::Sender<WindowReport>>,
    counters: Arc<TimerCounters>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let period = sync.window_length();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(window_ms = sync.window_length_ms(), "Window timer started");

    let mut last_index = sync.windows_closed();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sync.advance_window();
                forward(&reports, report, &mut last_index, &counters);
            }
            _ = &mut shutdown_rx => break,
        }
    }

    let report = sync.close_sync_window();
    forward(&reports, report, &mut last_index, &counters);

    debug!(
        windows = counters.windows_completed.load(Ordering::Relaxed),
        "Window timer stopped"
    );
}

fn forward(
    reports: &Option<mpsc::Sender<WindowReport>>,
    report: WindowReport,
    last_index: &mut u64,
    counters: &TimerCounters,
) {
    // window was already closed elsewhere
    if report.window_index <= *last_index {
        return;
    }
    *last_index = report.window_index;
    counters.windows_completed.fetch_add(1, Ordering::Relaxed);

    let Some(tx) = reports else {
        return;
    };
    match tx.try_send(report) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(r)) => {
            counters.reports_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(window_index = r.window_index, "Report queue full, report dropped");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            counters.reports_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{StreamKey, SyncStatus};
    use tokio::time::{sleep, Duration};

    fn synchronizer(window_ms: f64) -> Arc<Synchronizer> {
        let sync = Synchronizer::new(window_ms, 0.01);
        let primary = StreamKey::new(1, 0);
        let secondary = StreamKey::new(2, 0);
        sync.add_data_stream(primary, 1000.0).unwrap();
        sync.add_data_stream(secondary, 1000.0).unwrap();
        sync.set_sync_bit(primary, 0).unwrap();
        sync.set_sync_bit(secondary, 0).unwrap();
        sync.set_primary_data_stream(primary);
        Arc::new(sync)
    }

    #[tokio::test]
    async fn test_timer_opens_and_closes_windows() {
        let sync = synchronizer(20.0);
        let (tx, mut rx) = mpsc::channel(64);

        let handle = WindowTimerHandle::spawn(Arc::clone(&sync), Some(tx));
        assert!(sync.is_window_open());

        sleep(Duration::from_millis(110)).await;
        handle.shutdown().await;

        assert!(!sync.is_window_open());
        let mut indices = Vec::new();
        while let Ok(report) = rx.try_recv() {
            indices.push(report.window_index);
        }
        assert!(indices.len() >= 2);
        assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(*indices.last().unwrap(), sync.windows_closed());
    }

    #[tokio::test]
    async fn test_full_queue_drops_reports() {
        let sync = synchronizer(10.0);
        let (tx, _rx) = mpsc::channel(1);

        let handle = WindowTimerHandle::spawn(Arc::clone(&sync), Some(tx));
        sleep(Duration::from_millis(80)).await;
        let running = handle.stats();
        let stats = handle.shutdown().await;

        assert!(running.windows_completed >= 2);
        assert!(stats.reports_dropped >= 1);
        assert!(stats.windows_completed > running.windows_completed);
    }

    #[tokio::test]
    async fn test_shutdown_stats_match_delivered_reports() {
        let sync = synchronizer(15.0);
        let (tx, mut rx) = mpsc::channel(64);

        let handle = WindowTimerHandle::spawn(Arc::clone(&sync), Some(tx));
        sleep(Duration::from_millis(50)).await;
        let stats = handle.shutdown().await;

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(stats.reports_dropped, 0);
        assert_eq!(stats.windows_completed, delivered);
        assert_eq!(stats.windows_completed, sync.windows_closed());
    }

    #[tokio::test]
    async fn test_pulses_during_timer_synchronize() {
        let sync = synchronizer(50.0);
        let handle = WindowTimerHandle::spawn(Arc::clone(&sync), None);

        // both streams see pulses at 1 kHz nominal, well inside one window
        sync.add_event(1, 0, 0, 0);
        sync.add_event(2, 0, 0, 5);
        sync.add_event(1, 0, 0, 10);
        sync.add_event(2, 0, 0, 15);

        handle.shutdown().await;

        assert_eq!(sync.get_status(2, 0), SyncStatus::Synced);
        let rate = sync.clock_snapshot(StreamKey::new(2, 0)).unwrap().estimated_rate();
        assert!((rate - 1000.0).abs() < 1e-6);
    }
}
