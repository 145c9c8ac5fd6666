//! Fixed-capacity circular sample store for one inbound stream.
//!
//! Storage is allocated once in [`AudioRingBuffer::new`] and never grows.
//! Writes that do not fit overwrite the oldest unread samples; every such
//! write is counted in [`AudioRingBuffer::overflow_count`].

use tracing::debug;

use crate::audio::AudioSample;

/// Circular buffer of interleaved samples with independent read/write cursors.
///
/// Capacity is expressed in frames of `frame_samples` samples each. The
/// buffer never blocks: reads fail (return `false`) when fewer samples are
/// available than requested.
pub struct AudioRingBuffer<Sample> {
    samples: Box<[Sample]>,
    frame_samples: usize,
    frame_capacity: usize,
    /// Index of the next sample to read.
    read_pos: usize,
    /// Index of the next sample to write.
    write_pos: usize,
    available: usize,
    overflow_count: u64,
}

impl<Sample: AudioSample> AudioRingBuffer<Sample> {
    pub fn new(frame_samples: usize, frame_capacity: usize) -> Self {
        let sample_capacity = frame_samples * frame_capacity;
        Self {
            samples: vec![Sample::silence(); sample_capacity].into_boxed_slice(),
            frame_samples,
            frame_capacity,
            read_pos: 0,
            write_pos: 0,
            available: 0,
            overflow_count: 0,
        }
    }

    fn sample_capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of unread samples.
    pub fn samples_available(&self) -> usize {
        self.available
    }

    /// Number of whole unread frames.
    pub fn frames_available(&self) -> usize {
        if self.frame_samples == 0 {
            return 0;
        }
        self.available / self.frame_samples
    }

    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Makes room for `len` incoming samples, dropping the oldest unread ones
    /// if needed. Returns how many of the `len` samples will be stored.
    fn reserve(&mut self, len: usize) -> usize {
        let capacity = self.sample_capacity();
        let to_write = len.min(capacity);
        let free = capacity - self.available;

        if len > free {
            let overwritten = to_write.saturating_sub(free);
            self.read_pos = (self.read_pos + overwritten) % capacity.max(1);
            self.available -= overwritten;
            self.overflow_count += 1;
            debug!(
                "Ring buffer overflow: {} samples requested, {} free, {} unread samples overwritten",
                len, free, overwritten
            );
        }

        to_write
    }

    /// Writes `len` silent samples at the write cursor.
    ///
    /// Returns the number of samples written, which is less than `len` only
    /// when `len` exceeds the whole buffer capacity.
    pub fn add_silent_samples(&mut self, len: usize) -> usize {
        let to_write = self.reserve(len);
        let capacity = self.sample_capacity();

        let first = to_write.min(capacity - self.write_pos);
        self.samples[self.write_pos..self.write_pos + first].fill(Sample::silence());
        self.samples[..to_write - first].fill(Sample::silence());

        self.advance_write(to_write);
        to_write
    }

    /// Copies `data` in at the write cursor.
    ///
    /// If `data` is larger than the whole buffer only its newest
    /// `capacity` samples are kept. Returns the number of samples written.
    pub fn write_samples(&mut self, data: &[Sample]) -> usize {
        let to_write = self.reserve(data.len());
        let data = &data[data.len() - to_write..];
        let capacity = self.sample_capacity();

        let first = to_write.min(capacity - self.write_pos);
        self.samples[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        self.samples[..to_write - first].copy_from_slice(&data[first..]);

        self.advance_write(to_write);
        to_write
    }

    fn advance_write(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.write_pos = (self.write_pos + len) % self.sample_capacity();
        self.available += len;
    }

    /// Copies `dest.len()` samples out and advances the read cursor.
    ///
    /// Returns `false` without touching the buffer if not enough samples are
    /// available.
    pub fn read_samples(&mut self, dest: &mut [Sample]) -> bool {
        let len = dest.len();
        let Some(slices) = self.peek(len) else {
            return false;
        };
        let (first, second) = (slices.first.len(), slices.second.len());
        dest[..first].copy_from_slice(slices.first);
        dest[first..first + second].copy_from_slice(slices.second);
        self.shift_read_position(len)
    }

    /// Discards `len` samples from the read cursor.
    pub fn shift_read_position(&mut self, len: usize) -> bool {
        if self.available < len {
            return false;
        }
        if len > 0 {
            self.read_pos = (self.read_pos + len) % self.sample_capacity();
            self.available -= len;
        }
        true
    }

    /// Borrows the next `len` unread samples without consuming them.
    ///
    /// The samples may straddle the end of storage, so they come back as two
    /// contiguous slices.
    pub fn peek(&self, len: usize) -> Option<ReadSlices<'_, Sample>> {
        if self.available < len {
            return None;
        }
        let capacity = self.sample_capacity();
        let first = len.min(capacity - self.read_pos);
        Some(ReadSlices {
            first: &self.samples[self.read_pos..self.read_pos + first],
            second: &self.samples[..len - first],
        })
    }

    /// Consumes `len` samples and hands back a borrow of them.
    ///
    /// The returned slices stay valid until the next mutation of the buffer,
    /// which the borrow checker enforces.
    pub fn pop(&mut self, len: usize) -> Option<ReadSlices<'_, Sample>> {
        if self.available < len {
            return None;
        }
        let start = self.read_pos;
        self.shift_read_position(len);

        let capacity = self.sample_capacity();
        let first = len.min(capacity - start);
        Some(ReadSlices {
            first: &self.samples[start..start + first],
            second: &self.samples[..len - first],
        })
    }

    /// Drops all unread samples and restores the initial cursors and counters.
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.available = 0;
        self.overflow_count = 0;
    }
}

/// A run of samples read from an [`AudioRingBuffer`], split at the wrap point.
#[derive(Debug, Clone, Copy)]
pub struct ReadSlices<'a, Sample> {
    pub first: &'a [Sample],
    pub second: &'a [Sample],
}

impl<'a, Sample: Copy> ReadSlices<'a, Sample> {
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + 'a {
        self.first.iter().chain(self.second.iter()).copied()
    }
}
