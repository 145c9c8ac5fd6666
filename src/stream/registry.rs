//! One [`InboundAudioStream`] per remote sender.
//!
//! Uses [`DashMap`] so the network thread (ingesting packets) and the mixer
//! thread (popping frames) can share the registry. Each stream is only ever
//! touched under its entry's shard lock, so ingestion and playout on the same
//! stream are serialized.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::AudioSample;

use super::clock::Clock;
use super::config::StreamConfig;
use super::format::StreamFormat;
use super::inbound::InboundAudioStream;
use super::packet::AudioPacket;
use super::stats::AudioStreamStats;

/// Builds the format for a newly seen sender.
pub type FormatFactory<Sample> = Box<dyn Fn() -> Box<dyn StreamFormat<Sample>> + Send + Sync>;

struct StreamEntry<Sample> {
    stream: InboundAudioStream<Sample>,
    last_seen: u64,
}

pub struct StreamRegistry<Sample> {
    config: StreamConfig,
    clock: Arc<dyn Clock>,
    format_factory: FormatFactory<Sample>,
    streams: DashMap<Uuid, StreamEntry<Sample>>,
    /// Mix accumulator, one slot per sample the ring buffers can hold.
    mix_scratch: Mutex<Box<[f64]>>,
}

impl<Sample: AudioSample> StreamRegistry<Sample> {
    pub fn new(
        config: StreamConfig,
        clock: Arc<dyn Clock>,
        format_factory: FormatFactory<Sample>,
    ) -> Result<Self> {
        config.validate()?;
        let scratch_len = config.frame_samples * config.frame_capacity;
        Ok(Self {
            mix_scratch: Mutex::new(vec![0.0; scratch_len].into_boxed_slice()),
            config,
            clock,
            format_factory,
            streams: DashMap::new(),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Routes a packet to its sender's stream, creating the stream on first
    /// contact. Returns the bytes consumed.
    pub fn receive(&self, packet: &AudioPacket<'_>) -> usize {
        let now = self.clock.now_micros();
        let mut entry = match self.streams.entry(packet.sender) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                let stream = match InboundAudioStream::new(
                    self.config.clone(),
                    (self.format_factory)(),
                    self.clock.clone(),
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Failed to create stream for {}: {:?}", packet.sender, e);
                        return 0;
                    }
                };
                info!("Creating inbound stream for sender {}", packet.sender);
                vacant.insert(StreamEntry {
                    stream,
                    last_seen: now,
                })
            }
        };

        entry.last_seen = now;
        entry.stream.parse_data(packet)
    }

    /// Pops `num_frames` from every stream and mixes them into `out`.
    ///
    /// Streams that cannot supply the frames contribute nothing. Returns how
    /// many streams were mixed; when it is zero `out` holds silence.
    pub fn pop_and_mix(&self, num_frames: usize, starve_on_fail: bool, out: &mut [Sample]) -> usize {
        let mut scratch = self
            .mix_scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let len = (num_frames * self.config.frame_samples)
            .min(out.len())
            .min(scratch.len());
        let mixed = &mut scratch[..len];
        mixed.fill(0.0);
        let mut mixed_streams = 0;

        for mut entry in self.streams.iter_mut() {
            if let Some(frames) = entry.stream.pop_frames_slices(num_frames, starve_on_fail) {
                mixed_streams += 1;
                for (acc, sample) in mixed.iter_mut().zip(frames.iter()) {
                    *acc += sample.to_f64_normalized();
                }
            }
        }

        for (dst, value) in out[..len].iter_mut().zip(mixed.iter()) {
            *dst = if mixed_streams == 0 {
                Sample::silence()
            } else {
                Sample::from_f64_normalized(*value)
            };
        }
        out[len..].fill(Sample::silence());

        mixed_streams
    }

    /// Drops streams whose sender has been silent for longer than `timeout`.
    pub fn cleanup_stale(&self, timeout: Duration) {
        let now = self.clock.now_micros();
        let timeout = timeout.as_micros() as u64;
        self.streams.retain(|sender, entry| {
            let alive = now.saturating_sub(entry.last_seen) < timeout;
            if !alive {
                info!("Removing stale inbound stream for sender {}", sender);
            }
            alive
        });
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn senders(&self) -> Vec<Uuid> {
        self.streams.iter().map(|entry| *entry.key()).collect()
    }

    /// Snapshot of one sender's stream, without rolling its history.
    pub fn stream_stats(&self, sender: Uuid) -> Option<AudioStreamStats> {
        self.streams
            .get(&sender)
            .map(|entry| entry.stream.audio_stream_stats())
    }

    /// Closes a report period on every stream and returns their snapshots.
    pub fn collect_stats(&self) -> Vec<(Uuid, AudioStreamStats)> {
        self.streams
            .iter_mut()
            .map(|mut entry| {
                let sender = *entry.key();
                (
                    sender,
                    entry.stream.update_seq_history_and_get_audio_stream_stats(),
                )
            })
            .collect()
    }
}
