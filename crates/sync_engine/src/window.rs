//! Synchronization window bookkeeping and rate fitting.

use contracts::{SyncStatus, WindowOutcome};

/// Observations collected by one stream during one window.
///
/// Pulses and primary times are tracked independently and paired by order
/// (first with first, last with last), so the order in which streams deliver
/// their pulses within a processing block does not matter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowBounds {
    /// First local pulse in the window
    pub start_sample: Option<i64>,
    /// First primary time bound in the window
    pub start_primary_time: Option<f64>,
    /// Latest local pulse in the window
    pub last_sample: Option<i64>,
    /// Latest primary time bound in the window
    pub last_primary_time: Option<f64>,
    pub pulse_count: u32,
    pub primary_time_count: u32,
}

impl WindowBounds {
    #[inline]
    pub fn record_pulse(&mut self, sample_number: i64) {
        self.start_sample.get_or_insert(sample_number);
        self.last_sample = Some(sample_number);
        self.pulse_count = self.pulse_count.saturating_add(1);
    }

    #[inline]
    pub fn record_primary_time(&mut self, time: f64) {
        self.start_primary_time.get_or_insert(time);
        self.last_primary_time = Some(time);
        self.primary_time_count = self.primary_time_count.saturating_add(1);
    }

    /// No local pulse was seen. Primary times alone carry nothing to fit.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pulse_count == 0
    }
}

/// Linear map from a stream's sample index to canonical time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub reference_sample: i64,
    pub reference_time: f64,
    /// Samples per canonical second
    pub rate: f64,
}

impl LinearFit {
    /// Sample 0 at time 0, advancing at `rate`
    pub fn anchored_at_zero(rate: f64) -> Self {
        Self {
            reference_sample: 0,
            reference_time: 0.0,
            rate,
        }
    }

    #[inline]
    pub fn time_at(&self, sample_number: i64) -> f64 {
        let elapsed = sample_number.saturating_sub(self.reference_sample) as f64;
        self.reference_time + elapsed / self.rate
    }
}

/// `|rate - expected| / expected <= tolerance`
#[inline]
pub fn within_tolerance(rate: f64, expected_rate: f64, tolerance: f64) -> bool {
    ((rate - expected_rate) / expected_rate).abs() <= tolerance
}

/// Evaluate a closed window for a non-primary stream.
///
/// Returns the outcome and, when accepted, the fit anchored at the window's
/// first pair.
pub fn fit_window(
    bounds: &WindowBounds,
    expected_rate: f64,
    tolerance: f64,
) -> (WindowOutcome, Option<LinearFit>) {
    if bounds.is_empty() {
        return (WindowOutcome::Empty, None);
    }

    let (Some(start_sample), Some(last_sample), Some(start_time), Some(last_time)) = (
        bounds.start_sample,
        bounds.last_sample,
        bounds.start_primary_time,
        bounds.last_primary_time,
    ) else {
        return (WindowOutcome::Unpaired, None);
    };

    if bounds.pulse_count != bounds.primary_time_count {
        return (WindowOutcome::Unpaired, None);
    }

    let sample_span = last_sample.saturating_sub(start_sample);
    let time_span = last_time - start_time;
    if sample_span == 0 || time_span == 0.0 || !time_span.is_finite() {
        return (WindowOutcome::Degenerate, None);
    }

    let rate = sample_span as f64 / time_span;
    if !rate.is_finite() {
        return (WindowOutcome::Degenerate, None);
    }

    if within_tolerance(rate, expected_rate, tolerance) {
        let fit = LinearFit {
            reference_sample: start_sample,
            reference_time: start_time,
            rate,
        };
        (WindowOutcome::Fitted { rate }, Some(fit))
    } else {
        (WindowOutcome::Rejected { rate }, None)
    }
}

/// Status transition applied when a window closes.
///
/// `has_fit` is whether the stream had an accepted fit before this window.
pub fn next_status(current: SyncStatus, has_fit: bool, outcome: &WindowOutcome) -> SyncStatus {
    match outcome {
        WindowOutcome::Primary | WindowOutcome::Fitted { .. } => SyncStatus::Synced,
        WindowOutcome::Empty => {
            if has_fit {
                SyncStatus::Syncing
            } else {
                SyncStatus::Off
            }
        }
        WindowOutcome::Unpaired | WindowOutcome::Rejected { .. } => SyncStatus::Syncing,
        // fit skipped, prior estimate retained
        WindowOutcome::Degenerate => match current {
            SyncStatus::Off => SyncStatus::Syncing,
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(pairs: &[(i64, f64)]) -> WindowBounds {
        let mut b = WindowBounds::default();
        for &(sample, time) in pairs {
            b.record_pulse(sample);
            b.record_primary_time(time);
        }
        b
    }

    #[test]
    fn test_last_pulse_wins() {
        let mut b = WindowBounds::default();
        b.record_pulse(10);
        b.record_pulse(20);
        b.record_pulse(30);
        assert_eq!(b.start_sample, Some(10));
        assert_eq!(b.last_sample, Some(30));
        assert_eq!(b.pulse_count, 3);
    }

    #[test]
    fn test_fit_drifted_stream() {
        let b = bounds(&[(0, 0.0), (30010, 1.0)]);
        let (outcome, fit) = fit_window(&b, 30000.0, 0.01);
        assert_eq!(outcome, WindowOutcome::Fitted { rate: 30010.0 });
        let fit = fit.unwrap();
        assert!((fit.time_at(15005) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_fit_outside_tolerance_rejected() {
        let b = bounds(&[(0, 0.0), (33000, 1.0)]);
        let (outcome, fit) = fit_window(&b, 30000.0, 0.01);
        assert!(matches!(outcome, WindowOutcome::Rejected { .. }));
        assert!(fit.is_none());
    }

    #[test]
    fn test_single_pair_is_degenerate() {
        let b = bounds(&[(500, 0.25)]);
        let (outcome, fit) = fit_window(&b, 2000.0, 0.01);
        assert_eq!(outcome, WindowOutcome::Degenerate);
        assert!(fit.is_none());
    }

    #[test]
    fn test_zero_primary_interval_is_degenerate() {
        let mut b = WindowBounds::default();
        b.record_pulse(0);
        b.record_pulse(100);
        b.record_primary_time(1.0);
        b.record_primary_time(1.0);
        assert_eq!(fit_window(&b, 100.0, 0.01).0, WindowOutcome::Degenerate);
    }

    #[test]
    fn test_pulses_without_primary_time_are_unpaired() {
        let mut b = WindowBounds::default();
        b.record_pulse(0);
        b.record_pulse(30000);
        assert_eq!(fit_window(&b, 30000.0, 0.01).0, WindowOutcome::Unpaired);
    }

    #[test]
    fn test_mismatched_counts_are_unpaired() {
        let mut b = bounds(&[(0, 0.0), (30000, 1.0)]);
        b.record_primary_time(2.0);
        assert_eq!(fit_window(&b, 30000.0, 0.01).0, WindowOutcome::Unpaired);
    }

    #[test]
    fn test_empty_window() {
        let (outcome, _) = fit_window(&WindowBounds::default(), 30000.0, 0.01);
        assert_eq!(outcome, WindowOutcome::Empty);
    }

    #[test]
    fn test_primary_times_without_pulses_are_empty() {
        let mut b = WindowBounds::default();
        b.record_primary_time(0.0);
        b.record_primary_time(1.0);
        assert!(b.is_empty());
        assert_eq!(fit_window(&b, 30000.0, 0.01).0, WindowOutcome::Empty);
        assert_eq!(next_status(SyncStatus::Off, false, &WindowOutcome::Empty), SyncStatus::Off);
    }

    #[test]
    fn test_status_transitions() {
        use SyncStatus::*;
        let fitted = WindowOutcome::Fitted { rate: 1.0 };
        let rejected = WindowOutcome::Rejected { rate: 2.0 };

        assert_eq!(next_status(Off, false, &WindowOutcome::Empty), Off);
        assert_eq!(next_status(Synced, true, &WindowOutcome::Empty), Syncing);
        assert_eq!(next_status(Off, false, &WindowOutcome::Degenerate), Syncing);
        assert_eq!(next_status(Synced, true, &WindowOutcome::Degenerate), Synced);
        assert_eq!(next_status(Syncing, false, &fitted), Synced);
        assert_eq!(next_status(Synced, true, &rejected), Syncing);
        assert_eq!(next_status(Off, false, &WindowOutcome::Unpaired), Syncing);
    }

    #[test]
    fn test_fit_is_monotonic() {
        let fit = LinearFit {
            reference_sample: 1000,
            reference_time: 3.0,
            rate: 29990.0,
        };
        let mut last = f64::NEG_INFINITY;
        for sample in (-50_000..200_000).step_by(997) {
            let t = fit.time_at(sample);
            assert!(t >= last);
            last = t;
        }
    }
}
