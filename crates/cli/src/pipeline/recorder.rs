//! Recorder side: drains stream buffers and timestamps each block.

use std::sync::Arc;

use contracts::{StreamKey, TimestampConverter};
use observability::{record_buffer_depth, RunningStats};
use sync_engine::TimestampConsumer;

const READ_BLOCK: usize = 1024;

/// Per-stream recording statistics
#[derive(Debug, Clone, Default)]
pub struct RecordedStream {
    pub samples: u64,
    pub blocks: u64,
    /// Blocks written while the stream was not synced
    pub provisional_blocks: u64,
    /// Canonical timestamp error of synced blocks, in microseconds
    pub alignment_error_us: RunningStats,
    pub last_timestamp: Option<f64>,
}

struct RecorderStream {
    key: StreamKey,
    consumer: TimestampConsumer,
    /// Physical rate, used to compute the true canonical time of a sample
    actual_rate: f64,
    stats: RecordedStream,
}

/// Drains every stream and converts block timestamps through a
/// [`TimestampConverter`].
pub struct Recorder {
    converter: Arc<dyn TimestampConverter>,
    streams: Vec<RecorderStream>,
    /// Canonical seconds per physical second
    canonical_scale: f64,
    data: Vec<Vec<f32>>,
    indices: Vec<i64>,
}

impl Recorder {
    /// `canonical_scale` is the primary's physical rate over its expected rate.
    pub fn new(converter: Arc<dyn TimestampConverter>, canonical_scale: f64) -> Self {
        Self {
            converter,
            streams: Vec::new(),
            canonical_scale,
            data: vec![vec![0.0; READ_BLOCK]],
            indices: vec![0; READ_BLOCK],
        }
    }

    pub fn add_stream(&mut self, key: StreamKey, consumer: TimestampConsumer, actual_rate: f64) {
        self.streams.push(RecorderStream {
            key,
            consumer,
            actual_rate,
            stats: RecordedStream::default(),
        });
    }

    /// Drain everything currently buffered. Returns samples read.
    pub fn drain(&mut self) -> u64 {
        let mut total = 0;
        for stream in &mut self.streams {
            record_buffer_depth(stream.key, stream.consumer.num_samples());
            loop {
                let read = stream.consumer.read_all_from_buffer(
                    &mut self.data,
                    &mut self.indices,
                    READ_BLOCK,
                    0,
                    1,
                );
                if read == 0 {
                    break;
                }
                total += read as u64;

                let first = self.indices[0];
                let timestamp = self.converter.convert_timestamp(stream.key, first);
                stream.stats.samples += read as u64;
                stream.stats.blocks += 1;
                stream.stats.last_timestamp = Some(timestamp);

                if self.converter.is_synced(stream.key) {
                    let truth = first as f64 / stream.actual_rate * self.canonical_scale;
                    stream
                        .stats
                        .alignment_error_us
                        .push((timestamp - truth) * 1e6);
                } else {
                    stream.stats.provisional_blocks += 1;
                }
            }
        }
        total
    }

    pub fn finish(mut self) -> Vec<(StreamKey, RecordedStream)> {
        self.drain();
        self.streams
            .into_iter()
            .map(|stream| (stream.key, stream.stats))
            .collect()
    }
}
