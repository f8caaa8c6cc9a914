//! Simulation statistics.

use std::time::Duration;

use contracts::{StreamKey, StreamSyncInfo};
use observability::{StatsSummary, SyncMetricsAggregator};
use serde::Serialize;

use super::recorder::RecordedStream;

/// Statistics from a simulation run
#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Samples produced across all streams
    pub samples_produced: u64,

    /// Samples dropped because a stream buffer was full
    pub samples_dropped: u64,

    /// Sync pulses delivered to the synchronizer
    pub pulses_sent: u64,

    /// Windows closed by the timer
    pub windows_completed: u64,

    /// Window reports the reporter could not keep up with
    pub reports_dropped: u64,

    /// Per-stream recorder results
    pub recorded: Vec<(StreamKey, RecordedStream)>,

    /// Final synchronizer state
    pub final_streams: Vec<StreamSyncInfo>,

    /// Window metrics aggregator
    pub sync_metrics: SyncMetricsAggregator,
}

/// JSON row of the final stream table
#[derive(Debug, Serialize)]
pub struct StreamResult<'a> {
    #[serde(flatten)]
    pub state: &'a StreamSyncInfo,
    pub drift_ppm: f64,
    pub samples_recorded: u64,
    pub provisional_blocks: u64,
    pub mean_alignment_error_us: Option<f64>,
}

impl SimulationStats {
    /// Samples per second produced across all streams
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.samples_produced as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn synced_streams(&self) -> usize {
        self.final_streams
            .iter()
            .filter(|s| s.status == contracts::SyncStatus::Synced)
            .count()
    }

    fn recorded(&self, key: StreamKey) -> Option<&RecordedStream> {
        self.recorded
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, r)| r)
    }

    pub fn stream_results(&self) -> Vec<StreamResult<'_>> {
        self.final_streams
            .iter()
            .map(|state| {
                let recorded = self.recorded(state.stream);
                StreamResult {
                    state,
                    drift_ppm: state.drift_ppm(),
                    samples_recorded: recorded.map_or(0, |r| r.samples),
                    provisional_blocks: recorded.map_or(0, |r| r.provisional_blocks),
                    mean_alignment_error_us: recorded
                        .filter(|r| r.alignment_error_us.count() > 0)
                        .map(|r| r.alignment_error_us.mean()),
                }
            })
            .collect()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Simulation Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Samples produced: {}", self.samples_produced);
        println!("   ├─ Samples dropped: {}", self.samples_dropped);
        println!("   ├─ Throughput: {:.0} samples/s", self.throughput());
        println!("   ├─ Pulses sent: {}", self.pulses_sent);
        println!("   ├─ Windows: {}", self.windows_completed);
        println!("   └─ Reports dropped: {}", self.reports_dropped);

        println!(
            "\n🕒 Streams ({} of {} synced)",
            self.synced_streams(),
            self.final_streams.len()
        );
        for (i, stream) in self.final_streams.iter().enumerate() {
            let is_last = i == self.final_streams.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let child_prefix = if is_last { "   " } else { "│  " };
            let role = if stream.is_primary { " [primary]" } else { "" };

            println!("   {} {}{}: {}", prefix, stream.stream, role, stream.status);
            println!(
                "   {}  ├─ Rate: {:.3} Hz (expected {}, drift {:+.1} ppm)",
                child_prefix,
                stream.estimated_rate,
                stream.expected_rate,
                stream.drift_ppm()
            );
            println!(
                "   {}  ├─ Pulses: {} recorded, {} ignored",
                child_prefix, stream.pulses_recorded, stream.pulses_ignored
            );
            if let Some(recorded) = self.recorded(stream.stream) {
                println!(
                    "   {}  ├─ Recorded: {} samples, {} provisional blocks",
                    child_prefix, recorded.samples, recorded.provisional_blocks
                );
                println!(
                    "   {}  └─ Alignment error (us): {}",
                    child_prefix,
                    StatsSummary::from(&recorded.alignment_error_us)
                );
            }
        }

        println!("\n📈 {}", self.sync_metrics.summary());
    }
}
