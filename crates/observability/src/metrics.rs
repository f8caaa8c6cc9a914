//! 同步窗口指标收集模块
//!
//! 基于 WindowReport 收集和统计时钟同步的运行指标。

use std::collections::{BTreeMap, HashMap};

use contracts::{drift_ppm, StreamKey, SyncStatus, WindowOutcome, WindowReport};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 登记 `clocksync_*` 指标的单位和说明
///
/// 导出器安装后调用一次；未安装 recorder 时为空操作。
pub fn describe_sync_metrics() {
    describe_counter!(
        "clocksync_windows_total",
        Unit::Count,
        "Synchronization windows closed"
    );
    describe_counter!(
        "clocksync_window_outcomes_total",
        Unit::Count,
        "Per-stream window evaluations by outcome"
    );
    describe_gauge!("clocksync_last_window_index", "Index of the latest closed window");
    describe_gauge!(
        "clocksync_streams_synced",
        Unit::Count,
        "Streams synced after the latest window"
    );
    describe_gauge!(
        "clocksync_estimated_rate_hz",
        Unit::CountPerSecond,
        "Sample rate used for timestamp conversion"
    );
    describe_gauge!(
        "clocksync_drift_ppm",
        "Estimated rate deviation from the nominal rate, parts per million"
    );
    describe_gauge!("clocksync_stream_synced", "1 when the stream is synced, else 0");
    describe_histogram!(
        "clocksync_candidate_drift_ppm",
        "Absolute drift of every fitted or rejected candidate rate, parts per million"
    );
    describe_gauge!(
        "clocksync_buffer_depth",
        Unit::Count,
        "Unread samples in a stream's timestamp buffer"
    );
    describe_counter!(
        "clocksync_samples_dropped_total",
        Unit::Count,
        "Samples dropped because a timestamp buffer was full"
    );
}

/// 从 WindowReport 记录指标
///
/// 每次窗口关闭时调用此函数来记录指标。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_window_report;
///
/// let report = synchronizer.advance_window();
/// record_window_report(&report);
/// ```
pub fn record_window_report(report: &WindowReport) {
    // 窗口计数器
    counter!("clocksync_windows_total").increment(1);
    gauge!("clocksync_last_window_index").set(report.window_index as f64);

    // 已同步数据流数量
    gauge!("clocksync_streams_synced").set(report.synced_count() as f64);

    for entry in &report.streams {
        let stream = entry.stream.to_string();

        gauge!("clocksync_estimated_rate_hz", "stream" => stream.clone())
            .set(entry.estimated_rate);

        gauge!("clocksync_drift_ppm", "stream" => stream.clone())
            .set(drift_ppm(entry.estimated_rate, entry.expected_rate));

        gauge!("clocksync_stream_synced", "stream" => stream.clone()).set(
            if entry.status == SyncStatus::Synced {
                1.0
            } else {
                0.0
            },
        );

        // 候选速率 (含被拒绝的拟合)
        if let Some(rate) = entry.outcome.candidate_rate() {
            histogram!("clocksync_candidate_drift_ppm", "stream" => stream)
                .record(drift_ppm(rate, entry.expected_rate).abs());
        }
    }
}

/// 记录时间戳缓冲区深度
pub fn record_buffer_depth(stream: StreamKey, depth: usize) {
    gauge!(
        "clocksync_buffer_depth",
        "stream" => stream.to_string()
    )
    .set(depth as f64);
}

/// 记录缓冲区满时丢弃的样本
pub fn record_samples_dropped(stream: StreamKey, count: usize) {
    if count > 0 {
        counter!(
            "clocksync_samples_dropped_total",
            "stream" => stream.to_string()
        )
        .increment(count as u64);
    }
}

/// 同步指标聚合器
///
/// 在内存中聚合窗口报告，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// 总窗口数
    pub total_windows: u64,

    /// 各窗口结果计数 (按 outcome 标签)
    pub outcome_counts: HashMap<&'static str, u64>,

    /// 失去同步的次数 (Synced -> 其他)
    pub sync_losses: u64,

    /// 各数据流统计
    pub streams: BTreeMap<StreamKey, StreamAggregate>,

    last_status: HashMap<StreamKey, SyncStatus>,
}

/// 单个数据流的聚合统计
#[derive(Debug, Clone, Default)]
pub struct StreamAggregate {
    /// 以 Synced 结束的窗口数
    pub synced_windows: u64,

    /// 参与统计的窗口数
    pub windows: u64,

    /// 被拒绝的拟合次数
    pub rejected_fits: u64,

    /// 候选速率漂移 (ppm)
    pub drift_ppm: RunningStats,

    /// 最新的估计速率
    pub last_estimated_rate: f64,
}

impl SyncMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, report: &WindowReport) {
        self.total_windows += 1;

        for entry in &report.streams {
            *self.outcome_counts.entry(entry.outcome.label()).or_insert(0) += 1;

            let previous = self.last_status.insert(entry.stream, entry.status);
            if previous == Some(SyncStatus::Synced) && entry.status != SyncStatus::Synced {
                self.sync_losses += 1;
            }

            let stream = self.streams.entry(entry.stream).or_default();
            stream.windows += 1;
            stream.last_estimated_rate = entry.estimated_rate;
            if entry.status == SyncStatus::Synced {
                stream.synced_windows += 1;
            }
            if matches!(entry.outcome, WindowOutcome::Rejected { .. }) {
                stream.rejected_fits += 1;
            }
            if let Some(rate) = entry.outcome.candidate_rate() {
                stream.drift_ppm.push(drift_ppm(rate, entry.expected_rate));
            }
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let fitted = self.outcome_counts.get("fitted").copied().unwrap_or(0);
        let rejected = self.outcome_counts.get("rejected").copied().unwrap_or(0);
        let evaluated = fitted + rejected;

        MetricsSummary {
            total_windows: self.total_windows,
            fitted_windows: fitted,
            rejected_windows: rejected,
            sync_losses: self.sync_losses,
            rejection_rate: if evaluated > 0 {
                rejected as f64 / evaluated as f64 * 100.0
            } else {
                0.0
            },
            streams: self
                .streams
                .iter()
                .map(|(key, stream)| StreamSummary {
                    stream: *key,
                    synced_ratio: if stream.windows > 0 {
                        stream.synced_windows as f64 / stream.windows as f64 * 100.0
                    } else {
                        0.0
                    },
                    rejected_fits: stream.rejected_fits,
                    estimated_rate: stream.last_estimated_rate,
                    drift_ppm: StatsSummary::from(&stream.drift_ppm),
                })
                .collect(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_windows: u64,
    pub fitted_windows: u64,
    pub rejected_windows: u64,
    pub sync_losses: u64,
    pub rejection_rate: f64,
    pub streams: Vec<StreamSummary>,
}

/// 单个数据流摘要
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub stream: StreamKey,
    pub synced_ratio: f64,
    pub rejected_fits: u64,
    pub estimated_rate: f64,
    pub drift_ppm: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Clock Sync Metrics Summary ===")?;
        writeln!(f, "Total windows: {}", self.total_windows)?;
        writeln!(f, "Fitted windows: {}", self.fitted_windows)?;
        writeln!(
            f,
            "Rejected windows: {} ({:.2}%)",
            self.rejected_windows, self.rejection_rate
        )?;
        writeln!(f, "Sync losses: {}", self.sync_losses)?;

        if !self.streams.is_empty() {
            writeln!(f, "Streams:")?;
            for stream in &self.streams {
                writeln!(
                    f,
                    "  {}: rate={:.3} Hz, synced {:.1}%, rejected={}, drift(ppm) {}",
                    stream.stream,
                    stream.estimated_rate,
                    stream.synced_ratio,
                    stream.rejected_fits,
                    stream.drift_ppm
                )?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::StreamWindowReport;

    #[test]
    fn test_describe_without_recorder_is_noop() {
        describe_sync_metrics();
        record_samples_dropped(StreamKey::new(1, 0), 0);
    }

    fn entry(
        source_id: u32,
        outcome: WindowOutcome,
        status: SyncStatus,
        estimated_rate: f64,
    ) -> StreamWindowReport {
        StreamWindowReport {
            stream: StreamKey::new(source_id, 0),
            outcome,
            status,
            estimated_rate,
            expected_rate: 30000.0,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = SyncMetricsAggregator::new();

        aggregator.update(&WindowReport {
            window_index: 1,
            primary: Some(StreamKey::new(100, 0)),
            streams: vec![
                entry(100, WindowOutcome::Primary, SyncStatus::Synced, 30000.0),
                entry(
                    101,
                    WindowOutcome::Fitted { rate: 30015.0 },
                    SyncStatus::Synced,
                    30015.0,
                ),
            ],
        });
        aggregator.update(&WindowReport {
            window_index: 2,
            primary: Some(StreamKey::new(100, 0)),
            streams: vec![
                entry(100, WindowOutcome::Primary, SyncStatus::Synced, 30000.0),
                entry(
                    101,
                    WindowOutcome::Rejected { rate: 33000.0 },
                    SyncStatus::Syncing,
                    30015.0,
                ),
            ],
        });

        assert_eq!(aggregator.total_windows, 2);
        assert_eq!(aggregator.outcome_counts.get("primary"), Some(&2));
        assert_eq!(aggregator.sync_losses, 1);

        let secondary = &aggregator.streams[&StreamKey::new(101, 0)];
        assert_eq!(secondary.windows, 2);
        assert_eq!(secondary.synced_windows, 1);
        assert_eq!(secondary.rejected_fits, 1);
        assert_eq!(secondary.drift_ppm.count(), 2);
        assert!((secondary.drift_ppm.min() - 500.0).abs() < 1e-6);

        let summary = aggregator.summary();
        assert_eq!(summary.fitted_windows, 1);
        assert!((summary.rejection_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            total_windows: 100,
            fitted_windows: 95,
            rejected_windows: 5,
            sync_losses: 2,
            rejection_rate: 5.0,
            streams: vec![StreamSummary {
                stream: StreamKey::new(101, 0),
                synced_ratio: 97.0,
                rejected_fits: 5,
                estimated_rate: 30010.0,
                drift_ppm: StatsSummary::default(),
            }],
        };

        let output = format!("{}", summary);
        assert!(output.contains("Total windows: 100"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("101.0"));
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_window_report(&WindowReport::default());
        record_buffer_depth(StreamKey::new(1, 0), 10);
        record_samples_dropped(StreamKey::new(1, 0), 0);
    }
}
