//! Starvation-aware playout buffer for one inbound audio stream.
//!
//! Wraps an [`AudioRingBuffer`] with the playout state machine:
//!
//! - Starts **starved**: pops fail until the buffer holds the desired depth.
//! - Becomes **playable** once `samples_available >= desired * frame_samples`.
//! - Goes back to starved only when a pop that opted into `starve_on_fail`
//!   finds too little data.
//!
//! The desired depth is set from outside (see
//! [`InboundAudioStream`](crate::stream::InboundAudioStream)). The buffer
//! shrinks toward it by dropping synthesized silence, never decoded audio.

use tracing::{debug, info, warn};

use crate::audio::AudioSample;
use crate::audio::buffers::ring_buffer::{AudioRingBuffer, ReadSlices};
use crate::stats::MovingMinMaxAvg;
use crate::stream::config::WindowConfig;
use crate::stream::format::AudioSink;

/// Frames above the desired depth tolerated before silence gets dropped.
/// Zero would aim at exactly the desired depth, which starves immediately.
const DESIRED_JITTER_BUFFER_FRAMES_PADDING: usize = 1;

pub struct JitterBuffer<Sample> {
    ring_buffer: AudioRingBuffer<Sample>,
    desired_jitter_buffer_frames: usize,
    is_starved: bool,
    has_started: bool,
    consecutive_not_mixed_count: u32,
    starve_count: u32,
    silent_frames_dropped: u64,
    frames_available_stats: MovingMinMaxAvg<usize>,
}

impl<Sample: AudioSample> JitterBuffer<Sample> {
    pub fn new(frame_samples: usize, frame_capacity: usize, frames_available: WindowConfig) -> Self {
        Self {
            ring_buffer: AudioRingBuffer::new(frame_samples, frame_capacity),
            desired_jitter_buffer_frames: 1,
            is_starved: true,
            has_started: false,
            consecutive_not_mixed_count: 0,
            starve_count: 0,
            silent_frames_dropped: 0,
            frames_available_stats: MovingMinMaxAvg::new(
                frames_available.interval_samples,
                frames_available.window_intervals,
            ),
        }
    }

    pub fn reset(&mut self) {
        self.ring_buffer.reset();
        self.desired_jitter_buffer_frames = 1;
        self.is_starved = true;
        self.has_started = false;
        self.consecutive_not_mixed_count = 0;
        self.starve_count = 0;
        self.silent_frames_dropped = 0;
        self.frames_available_stats.reset();
    }

    pub fn ring_buffer(&self) -> &AudioRingBuffer<Sample> {
        &self.ring_buffer
    }

    pub fn desired_jitter_buffer_frames(&self) -> usize {
        self.desired_jitter_buffer_frames
    }

    /// Largest depth the buffer can target and still accept a frame.
    pub fn max_desired_jitter_buffer_frames(&self) -> usize {
        self.ring_buffer.frame_capacity().saturating_sub(1).max(1)
    }

    /// Sets the target depth, clamped to `1..=capacity - 1`.
    pub fn set_desired_jitter_buffer_frames(&mut self, frames: usize) {
        let frames = frames.clamp(1, self.max_desired_jitter_buffer_frames());
        if frames != self.desired_jitter_buffer_frames {
            debug!(
                "Desired jitter buffer frames {} -> {}",
                self.desired_jitter_buffer_frames, frames
            );
            self.desired_jitter_buffer_frames = frames;
        }
    }

    pub fn is_starved(&self) -> bool {
        self.is_starved
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn consecutive_not_mixed_count(&self) -> u32 {
        self.consecutive_not_mixed_count
    }

    pub fn starve_count(&self) -> u32 {
        self.starve_count
    }

    pub fn silent_frames_dropped(&self) -> u64 {
        self.silent_frames_dropped
    }

    pub fn frames_available(&self) -> usize {
        self.ring_buffer.frames_available()
    }

    /// Average occupancy over the last closed window, in frames.
    pub fn frames_available_average(&self) -> f64 {
        self.frames_available_stats.window_average()
    }

    /// Leaves the starved state once the desired depth has accumulated.
    pub fn update_starved_state(&mut self) {
        let threshold = self.desired_jitter_buffer_frames * self.ring_buffer.frame_samples();
        if self.is_starved && self.ring_buffer.samples_available() >= threshold {
            info!(
                "Jitter buffer playable: {} frames buffered, {} desired",
                self.ring_buffer.frames_available(),
                self.desired_jitter_buffer_frames
            );
            self.is_starved = false;
        }
    }

    /// Feeds the current occupancy into the occupancy statistics.
    pub fn record_frames_available(&mut self) {
        self.frames_available_stats
            .update(self.ring_buffer.frames_available());
    }

    fn set_to_starved(&mut self) {
        self.is_starved = true;
        self.consecutive_not_mixed_count = 0;
        self.starve_count += 1;
        debug!(
            "Jitter buffer starved (#{}): {} samples available",
            self.starve_count,
            self.ring_buffer.samples_available()
        );
    }

    /// Shared bookkeeping for every pop flavour.
    ///
    /// Returns the number of samples the caller may now consume, or `None`
    /// if the pop fails.
    fn begin_pop(&mut self, num_frames: usize, starve_on_fail: bool) -> Option<usize> {
        if self.is_starved {
            self.consecutive_not_mixed_count += 1;
            return None;
        }

        let requested = num_frames * self.ring_buffer.frame_samples();
        let available = self.ring_buffer.samples_available();
        if available >= requested {
            self.has_started = true;
            self.frames_available_stats
                .update((available - requested) / self.ring_buffer.frame_samples());
            Some(requested)
        } else {
            if starve_on_fail {
                self.set_to_starved();
                self.consecutive_not_mixed_count += 1;
            }
            self.record_frames_available();
            None
        }
    }

    /// Consumes `num_frames` frames without copying them anywhere.
    pub fn pop_frames(&mut self, num_frames: usize, starve_on_fail: bool) -> bool {
        match self.begin_pop(num_frames, starve_on_fail) {
            Some(len) => self.ring_buffer.shift_read_position(len),
            None => false,
        }
    }

    /// Consumes `num_frames` frames into the front of `dest`.
    ///
    /// A `dest` too small for the frames fails the pop without starving.
    pub fn pop_frames_into(
        &mut self,
        dest: &mut [Sample],
        num_frames: usize,
        starve_on_fail: bool,
    ) -> bool {
        let requested = num_frames * self.ring_buffer.frame_samples();
        if dest.len() < requested && !self.is_starved {
            warn!(
                "Pop destination holds {} samples, {} requested",
                dest.len(),
                requested
            );
            self.record_frames_available();
            return false;
        }
        match self.begin_pop(num_frames, starve_on_fail) {
            Some(len) => self.ring_buffer.read_samples(&mut dest[..len]),
            None => false,
        }
    }

    /// Consumes `num_frames` frames and lends them out in place.
    pub fn pop_frames_slices(
        &mut self,
        num_frames: usize,
        starve_on_fail: bool,
    ) -> Option<ReadSlices<'_, Sample>> {
        let len = self.begin_pop(num_frames, starve_on_fail)?;
        self.ring_buffer.pop(len)
    }

    /// Writes synthesized silence, dropping whole frames of it when the
    /// buffer has been running deeper than it needs to.
    ///
    /// Dropping is considered at most once per closed occupancy window, and
    /// only when that window is fully populated. Returns the number of
    /// samples actually written.
    pub fn write_droppable_silent_samples(&mut self, num_silent_samples: usize) -> usize {
        let frame_samples = self.ring_buffer.frame_samples();
        let mut frames_to_drop = 0;

        if self.frames_available_stats.new_stats_available()
            && self.frames_available_stats.is_window_filled()
            && num_silent_samples >= frame_samples
        {
            self.frames_available_stats.clear_new_stats_available();
            let average_frames = self.frames_available_stats.window_average() as usize;
            let desired_plus_padding =
                self.desired_jitter_buffer_frames + DESIRED_JITTER_BUFFER_FRAMES_PADDING;

            if average_frames > desired_plus_padding {
                let silent_frames_received = num_silent_samples / frame_samples;
                frames_to_drop = (average_frames - desired_plus_padding).min(silent_frames_received);

                self.frames_available_stats.reset();
                self.silent_frames_dropped += frames_to_drop as u64;
                debug!(
                    "Dropped {} silent frames: average depth {} frames, desired {}",
                    frames_to_drop, average_frames, self.desired_jitter_buffer_frames
                );
            }
        }

        self.ring_buffer
            .add_silent_samples(num_silent_samples - frames_to_drop * frame_samples)
    }
}

impl<Sample: AudioSample> AudioSink<Sample> for JitterBuffer<Sample> {
    fn write_samples(&mut self, samples: &[Sample]) -> usize {
        self.ring_buffer.write_samples(samples)
    }

    fn write_silent_samples(&mut self, len: usize) -> usize {
        self.write_droppable_silent_samples(len)
    }
}
