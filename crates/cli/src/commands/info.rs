//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{StreamSyncInfo, SyncBlueprint};
use serde::Serialize;
use sync_engine::Synchronizer;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    sync_settings: SyncInfo,
    streams: Vec<StreamInfo>,
}

#[derive(Serialize)]
struct SyncInfo {
    window_length_ms: f64,
    rate_tolerance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary: Option<String>,
    display_buffer_capacity: usize,
    available: bool,
}

#[derive(Serialize)]
struct StreamInfo {
    key: String,
    name: String,
    #[serde(flatten)]
    state: StreamSyncInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    simulated_rate: Option<f64>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;
    let sync = Synchronizer::from_blueprint(&blueprint)
        .context("Failed to build synchronizer from configuration")?;

    let info = build_config_info(&blueprint, &sync);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &SyncBlueprint, sync: &Synchronizer) -> ConfigInfo {
    let streams = sync
        .stream_infos()
        .into_iter()
        .map(|state| {
            let config = blueprint.stream(state.stream);
            StreamInfo {
                key: state.stream.to_string(),
                name: config
                    .map(|c| c.label())
                    .unwrap_or_else(|| state.stream.to_string()),
                simulated_rate: config.and_then(|c| c.simulated_rate),
                state,
            }
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        sync_settings: SyncInfo {
            window_length_ms: sync.window_length_ms(),
            rate_tolerance: sync.rate_tolerance(),
            primary: sync.primary_stream().map(|p| p.to_string()),
            display_buffer_capacity: blueprint.sync.display_buffer_capacity,
            available: sync.is_available(),
        },
        streams,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  clocksync Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let sync = &info.sync_settings;
    println!("⚙️  Sync Settings");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Window: {} ms", sync.window_length_ms);
    println!("   ├─ Rate tolerance: {}", sync.rate_tolerance);
    println!("   ├─ Display buffer: {} samples", sync.display_buffer_capacity);
    println!(
        "   └─ Primary: {}",
        sync.primary.as_deref().unwrap_or("(none - synchronizer unavailable)")
    );

    println!("\n📡 Streams ({})", info.streams.len());
    for (i, stream) in info.streams.iter().enumerate() {
        let is_last = i == info.streams.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        let role = if stream.state.is_primary {
            " [primary]"
        } else {
            ""
        };
        println!("   {} {} ({}){}", prefix, stream.name, stream.key, role);
        println!(
            "   {}  ├─ Expected rate: {} Hz",
            child_prefix, stream.state.expected_rate
        );
        if let Some(rate) = stream.simulated_rate {
            println!("   {}  ├─ Simulated rate: {} Hz", child_prefix, rate);
        }
        match stream.state.sync_channel {
            Some(channel) => println!("   {}  ├─ Sync channel: {}", child_prefix, channel),
            None => println!("   {}  ├─ Sync channel: (none)", child_prefix),
        }
        println!("   {}  └─ Status: {}", child_prefix, stream.state.status);
    }

    println!();
}
