//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// clocksync - multi-stream sample clock synchronization
#[derive(Parser, Debug)]
#[command(
    name = "clocksync",
    author,
    version,
    about = "Multi-stream sample clock synchronization",
    long_about = "Aligns independently clocked acquisition streams onto one canonical timeline.\n\n\
                  Estimates each stream's true sample rate from shared sync pulses and \n\
                  converts sample indices to the primary stream's time."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CLOCKSYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CLOCKSYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the synchronizer against synthetic drifting streams
    Simulate(SimulateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Path to configuration file (TOML or JSON); built-in demo setup if omitted
    #[arg(short, long, env = "CLOCKSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Simulated acquisition time in seconds
    #[arg(long, default_value = "10", env = "CLOCKSYNC_DURATION")]
    pub duration: f64,

    /// Interval between sync pulses in seconds
    #[arg(long, default_value = "0.25")]
    pub pulse_interval: f64,

    /// Clock drift applied to secondary streams without `simulated_rate`
    #[arg(long, default_value = "100", allow_hyphen_values = true)]
    pub drift_ppm: f64,

    /// Acquisition block period in milliseconds
    #[arg(long, default_value = "10")]
    pub block_ms: u64,

    /// Report queue capacity
    #[arg(long, default_value = "16", env = "CLOCKSYNC_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CLOCKSYNC_METRICS_PORT")]
    pub metrics_port: u16,

    /// Print the final stream table as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "clocksync.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "clocksync.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
