//! Timestamped sample buffer.
//!
//! Fixed-capacity FIFO of `(value, sample index)` pairs backed by a `HeapRb`.
//! Writes never overwrite unread data: when the buffer is full the newest
//! samples are dropped and the caller learns how many were accepted.
//!
//! [`TimestampedRingBuffer::split`] hands out a producer/consumer pair for
//! use across threads without locking.

use std::fmt;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// One sample value and the sample index it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedSample {
    pub value: f32,
    pub index: i64,
}

/// Single-owner timestamped buffer
pub struct TimestampedRingBuffer {
    rb: HeapRb<TimestampedSample>,
    last_index: Option<i64>,
}

impl fmt::Debug for TimestampedRingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampedRingBuffer")
            .field("len", &self.rb.occupied_len())
            .field("capacity", &self.capacity())
            .field("last_index", &self.last_index)
            .finish()
    }
}

impl TimestampedRingBuffer {
    /// Create a buffer holding up to `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity.max(1)),
            last_index: None,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.rb.capacity().get()
    }

    /// Number of unread samples
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.rb.occupied_len()
    }

    /// Index of the most recently accepted sample
    #[inline]
    pub fn last_index(&self) -> Option<i64> {
        self.last_index
    }

    /// Append up to `count` samples.
    ///
    /// Value `i` is paired with `indices[i / chunk_size]`, so a block of
    /// samples can share a single index per chunk. Only the prefix that fits
    /// in the free space is written; returns how many samples were accepted.
    #[inline]
    pub fn add_to_buffer(
        &mut self,
        values: &[f32],
        indices: &[i64],
        count: usize,
        chunk_size: usize,
    ) -> usize {
        let (written, last) = push_pairs(&mut self.rb, values, indices, count, chunk_size);
        if last.is_some() {
            self.last_index = last;
        }
        written
    }

    /// Drain up to `max_size` samples.
    ///
    /// Each value is written to channels `dst_offset .. dst_offset +
    /// channel_count` of `dest` at the same position, and its sample index to
    /// `dest_indices`. Returns the number of samples read.
    pub fn read_all_from_buffer<D: AsMut<[f32]>>(
        &mut self,
        dest: &mut [D],
        dest_indices: &mut [i64],
        max_size: usize,
        dst_offset: usize,
        channel_count: usize,
    ) -> usize {
        pop_pairs(
            &mut self.rb,
            dest,
            dest_indices,
            max_size,
            dst_offset,
            channel_count,
        )
    }

    /// Reallocate with a new capacity, discarding content.
    pub fn resize(&mut self, capacity: usize) {
        self.rb = HeapRb::new(capacity.max(1));
        self.last_index = None;
    }

    /// Discard content, keeping the allocation.
    pub fn clear(&mut self) {
        self.rb.clear();
        self.last_index = None;
    }

    /// Split into a producer and a consumer that can live on different threads.
    pub fn split(self) -> (TimestampProducer, TimestampConsumer) {
        let (prod, cons) = self.rb.split();
        (
            TimestampProducer {
                prod,
                last_index: self.last_index,
            },
            TimestampConsumer { cons },
        )
    }
}

/// Write half of a split [`TimestampedRingBuffer`]
pub struct TimestampProducer {
    prod: HeapProd<TimestampedSample>,
    last_index: Option<i64>,
}

impl TimestampProducer {
    /// See [`TimestampedRingBuffer::add_to_buffer`].
    #[inline]
    pub fn add_to_buffer(
        &mut self,
        values: &[f32],
        indices: &[i64],
        count: usize,
        chunk_size: usize,
    ) -> usize {
        let (written, last) = push_pairs(&mut self.prod, values, indices, count, chunk_size);
        if last.is_some() {
            self.last_index = last;
        }
        written
    }

    pub fn last_index(&self) -> Option<i64> {
        self.last_index
    }

    pub fn free_len(&self) -> usize {
        self.prod.vacant_len()
    }
}

/// Read half of a split [`TimestampedRingBuffer`]
pub struct TimestampConsumer {
    cons: HeapCons<TimestampedSample>,
}

impl TimestampConsumer {
    /// See [`TimestampedRingBuffer::read_all_from_buffer`].
    pub fn read_all_from_buffer<D: AsMut<[f32]>>(
        &mut self,
        dest: &mut [D],
        dest_indices: &mut [i64],
        max_size: usize,
        dst_offset: usize,
        channel_count: usize,
    ) -> usize {
        pop_pairs(
            &mut self.cons,
            dest,
            dest_indices,
            max_size,
            dst_offset,
            channel_count,
        )
    }

    pub fn num_samples(&self) -> usize {
        self.cons.occupied_len()
    }

    pub fn clear(&mut self) {
        self.cons.clear();
    }
}

fn push_pairs<P>(
    prod: &mut P,
    values: &[f32],
    indices: &[i64],
    count: usize,
    chunk_size: usize,
) -> (usize, Option<i64>)
where
    P: Producer<Item = TimestampedSample>,
{
    let chunk_size = chunk_size.max(1);
    let count = count
        .min(values.len())
        .min(indices.len().saturating_mul(chunk_size))
        .min(prod.vacant_len());

    let mut last = None;
    for (i, &value) in values[..count].iter().enumerate() {
        let index = indices[i / chunk_size];
        if prod.try_push(TimestampedSample { value, index }).is_err() {
            return (i, last);
        }
        last = Some(index);
    }
    (count, last)
}

fn pop_pairs<C, D>(
    cons: &mut C,
    dest: &mut [D],
    dest_indices: &mut [i64],
    max_size: usize,
    dst_offset: usize,
    channel_count: usize,
) -> usize
where
    C: Consumer<Item = TimestampedSample>,
    D: AsMut<[f32]>,
{
    let channel_end = dst_offset.saturating_add(channel_count).min(dest.len());
    let channels = dest.get_mut(dst_offset..channel_end).unwrap_or_default();

    let limit = channels
        .iter_mut()
        .map(|channel| channel.as_mut().len())
        .fold(max_size.min(dest_indices.len()), usize::min);

    let mut read = 0;
    while read < limit {
        let Some(sample) = cons.try_pop() else {
            break;
        };
        for channel in channels.iter_mut() {
            channel.as_mut()[read] = sample.value;
        }
        dest_indices[read] = sample.index;
        read += 1;
    }
    read
}
