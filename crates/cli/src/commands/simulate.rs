//! `simulate` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use super::load_blueprint;
use crate::cli::SimulateArgs;
use crate::error::CliError;
use crate::pipeline::{Simulation, SimulationConfig};

/// Execute the `simulate` command
pub async fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            load_blueprint(path)?
        }
        None => {
            info!("No configuration given, using built-in demo setup");
            config_loader::ConfigLoader::demo().context("Built-in demo setup is invalid")?
        }
    };

    info!(
        streams = blueprint.streams.len(),
        primary = ?blueprint.sync.primary,
        window_ms = blueprint.sync.window_length_ms,
        "Configuration loaded"
    );

    if !args.duration.is_finite() || args.duration <= 0.0 {
        return Err(CliError::invalid_parameter(
            "duration",
            format!("must be > 0, got {}", args.duration),
        )
        .into());
    }

    let config = SimulationConfig {
        blueprint,
        duration: Duration::from_secs_f64(args.duration),
        pulse_interval: args.pulse_interval,
        drift_ppm: args.drift_ppm,
        block: Duration::from_millis(args.block_ms),
        report_queue: args.buffer_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let stats = Simulation::new(config)
        .run(shutdown_signal())
        .await
        .context("Simulation failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&stats.stream_results())
            .context("Failed to serialize simulation results")?;
        println!("{}", json);
    } else {
        stats.print_summary();
    }

    info!("clocksync finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
