//! Synthetic acquisition stream.
//!
//! Emits a sine wave at its own physical rate into a timestamped buffer and
//! reports sync pulses to the synchronizer at the sample where they land.

use std::f64::consts::TAU;

use contracts::{ChannelIndex, StreamKey};
use sync_engine::{Synchronizer, TimestampProducer};

const SIGNAL_HZ: f64 = 10.0;

/// Per-block production counters
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockOutput {
    pub produced: usize,
    pub dropped: usize,
    pub pulses: usize,
}

pub struct SyntheticStream {
    key: StreamKey,
    sync_channel: Option<ChannelIndex>,
    actual_rate: f64,
    next_sample: i64,
    next_pulse: u64,
    producer: TimestampProducer,
    values: Vec<f32>,
    indices: Vec<i64>,
}

impl SyntheticStream {
    pub fn new(
        key: StreamKey,
        sync_channel: Option<ChannelIndex>,
        actual_rate: f64,
        producer: TimestampProducer,
    ) -> Self {
        Self {
            key,
            sync_channel,
            actual_rate,
            next_sample: 0,
            next_pulse: 0,
            producer,
            values: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }

    /// Deliver pulses due by `physical_time`, then produce every sample up
    /// to it.
    ///
    /// Pulse timing follows physical time, so every stream sees a given
    /// pulse in the same block.
    pub fn advance(
        &mut self,
        physical_time: f64,
        pulse_interval: f64,
        sync: &Synchronizer,
    ) -> BlockOutput {
        let mut output = BlockOutput::default();

        if let Some(channel) = self.sync_channel {
            while self.next_pulse as f64 * pulse_interval <= physical_time {
                let pulse_time = self.next_pulse as f64 * pulse_interval;
                let sample = (pulse_time * self.actual_rate).round() as i64;
                sync.add_event(self.key.source_id, self.key.sub_stream_id, channel, sample);
                self.next_pulse += 1;
                output.pulses += 1;
            }
        }

        let end = (physical_time * self.actual_rate).floor() as i64;
        if end <= self.next_sample {
            return output;
        }

        self.values.clear();
        self.indices.clear();
        for index in self.next_sample..end {
            let phase = TAU * SIGNAL_HZ * index as f64 / self.actual_rate;
            self.values.push(phase.sin() as f32);
            self.indices.push(index);
        }
        let count = self.values.len();
        let written = self
            .producer
            .add_to_buffer(&self.values, &self.indices, count, 1);

        self.next_sample = end;
        output.produced = count;
        output.dropped = count - written;
        output
    }
}
