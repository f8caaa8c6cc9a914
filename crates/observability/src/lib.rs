//! # Observability
//!
//! 时钟同步的可观测性：结构化日志 + Prometheus 指标。
//!
//! - `init_with_config` 安装 tracing 订阅器，可选启动 Prometheus 导出
//! - 所有 `clocksync_*` 指标在导出前登记说明与单位
//! - [`metrics`] 模块把 `WindowReport` 转换为指标并做进程内聚合
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::logging_only(LogFormat::Compact, "info"))?;
//!
//! let report = synchronizer.advance_window();
//! observability::record_window_report(&report);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_buffer_depth, record_samples_dropped, record_window_report, MetricsSummary,
    RunningStats, StatsSummary, StreamAggregate, StreamSummary, SyncMetricsAggregator,
};

/// Prometheus 默认端口
pub const DEFAULT_METRICS_PORT: u16 = 9464;

/// 候选漂移直方图分桶 (|ppm|)
///
/// 晶振漂移通常在几十 ppm 内；超过容差 (默认 1% = 10000 ppm) 的拟合会被拒绝。
const DRIFT_PPM_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0];

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 只输出日志)
    pub metrics_port: Option<u16>,
    /// 未设置 RUST_LOG 时使用的过滤指令
    pub default_log_level: String,
}

impl ObservabilityConfig {
    /// 仅日志，不启动 Prometheus
    pub fn logging_only(log_format: LogFormat, default_log_level: impl Into<String>) -> Self {
        Self {
            log_format,
            metrics_port: None,
            default_log_level: default_log_level.into(),
        }
    }

    /// RUST_LOG 优先
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(DEFAULT_METRICS_PORT),
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON 结构化日志 (采集端默认)
    #[default]
    Json,
    Pretty,
    Compact,
}

/// 默认配置：JSON 日志 + 9464 端口导出
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 按配置安装订阅器，并在需要时启动导出器
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 只启动 Prometheus 导出 (tracing 已由调用方安装)
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_prometheus(port)
}

fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Full("clocksync_candidate_drift_ppm".to_string()),
            DRIFT_PPM_BUCKETS,
        )
        .context("Invalid drift histogram buckets")?
        .install()
        .with_context(|| format!("Failed to start metrics exporter on port {port}"))?;

    crate::metrics::describe_sync_metrics();
    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
