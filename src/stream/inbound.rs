//! One remote audio source, from packet ingestion to frame playout.
//!
//! ```text
//! parse_data ─► SequenceNumberStats ─► [silence for gaps] ─► StreamFormat ─► JitterBuffer
//!                                                                               │
//!        arrival gaps ─► desired depth ────────────────────────────────────────┘
//!                                                                               │
//! pop_frames* ◄─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ingestion and playout may run on different threads, but each side must be
//! serialized by the owner (see [`StreamRegistry`](super::StreamRegistry)).
//! Nothing here blocks or allocates after construction.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::audio::AudioSample;
use crate::audio::buffers::{JitterBuffer, ReadSlices};
use crate::stats::{ArrivalStatus, MovingMinMaxAvg, SequenceNumberStats};

use super::clock::Clock;
use super::config::StreamConfig;
use super::format::{AudioSink, StreamFormat};
use super::packet::AudioPacket;
use super::stats::AudioStreamStats;

const SEQUENCE_NUMBER_LEN: usize = 2;

pub struct InboundAudioStream<Sample> {
    config: StreamConfig,
    format: Box<dyn StreamFormat<Sample>>,
    clock: Arc<dyn Clock>,
    buffer: JitterBuffer<Sample>,
    incoming_sequence_number_stats: SequenceNumberStats,
    last_frame_received_time: Option<u64>,
    interframe_time_gap_stats_for_jitter_calc: MovingMinMaxAvg<u64>,
    interframe_time_gap_stats_for_stats_packet: MovingMinMaxAvg<u64>,
}

impl<Sample: AudioSample> InboundAudioStream<Sample> {
    pub fn new(
        config: StreamConfig,
        format: Box<dyn StreamFormat<Sample>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let jitter_calc = config.jitter_calc_gaps;
        let stats_packet = config.stats_gaps;

        Ok(Self {
            buffer: JitterBuffer::new(
                config.frame_samples,
                config.frame_capacity,
                config.frames_available_stats,
            ),
            incoming_sequence_number_stats: SequenceNumberStats::new(config.seq_history_len),
            last_frame_received_time: None,
            interframe_time_gap_stats_for_jitter_calc: MovingMinMaxAvg::new(
                jitter_calc.interval_samples,
                jitter_calc.window_intervals,
            ),
            interframe_time_gap_stats_for_stats_packet: MovingMinMaxAvg::new(
                stats_packet.interval_samples,
                stats_packet.window_intervals,
            ),
            config,
            format,
            clock,
        })
    }

    /// Returns every buffer, statistic and counter to its initial state.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.incoming_sequence_number_stats.reset();
        self.last_frame_received_time = None;
        self.interframe_time_gap_stats_for_jitter_calc.reset();
        self.interframe_time_gap_stats_for_stats_packet.reset();
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Ingests one packet body. Returns the number of body bytes consumed.
    ///
    /// Early packets get silence written for the presumed-lost packets ahead
    /// of their own audio. Late and duplicate packets are discarded, even if
    /// the slot they belong to has not been played yet.
    pub fn parse_data(&mut self, packet: &AudioPacket<'_>) -> usize {
        let body = packet.body;
        let Some(sequence_bytes) = body.get(..SEQUENCE_NUMBER_LEN) else {
            debug!(
                "Dropping {} byte packet from {}: no sequence number",
                body.len(),
                packet.sender
            );
            return 0;
        };
        let sequence = u16::from_le_bytes([sequence_bytes[0], sequence_bytes[1]]);
        let mut read_bytes = SEQUENCE_NUMBER_LEN;

        let arrival = self
            .incoming_sequence_number_stats
            .record_arrival(sequence, packet.sender);

        let properties = self
            .format
            .parse_stream_properties(packet.packet_type, &body[read_bytes..]);
        read_bytes = (read_bytes + properties.bytes_read).min(body.len());
        let num_audio_samples = properties.num_audio_samples;

        match arrival.status {
            ArrivalStatus::Early | ArrivalStatus::OnTime => {
                if arrival.status == ArrivalStatus::Early {
                    let packets_dropped = arrival.gap_from_expected.max(0) as usize;
                    self.buffer
                        .write_droppable_silent_samples(packets_dropped * num_audio_samples);
                }
                let audio_bytes = self.format.parse_audio_data(
                    packet.packet_type,
                    &body[read_bytes..],
                    num_audio_samples,
                    &mut self.buffer,
                );
                read_bytes = (read_bytes + audio_bytes).min(body.len());
            }
            ArrivalStatus::Late | ArrivalStatus::Duplicate => {
                debug!(
                    "Discarding {:?} packet seq {} from {}",
                    arrival.status, sequence, packet.sender
                );
            }
        }

        self.frame_received_update_timing_stats();
        self.buffer.update_starved_state();
        self.buffer.record_frames_available();

        read_bytes
    }

    /// Writes keep-alive silence through the droppable path.
    pub fn write_silent_samples(&mut self, num_samples: usize) -> usize {
        let written = self.buffer.write_silent_samples(num_samples);
        self.buffer.update_starved_state();
        written
    }

    fn frame_received_update_timing_stats(&mut self) {
        let now = self.clock.now_micros();
        if let Some(last) = self.last_frame_received_time {
            let gap = now.saturating_sub(last);
            self.interframe_time_gap_stats_for_jitter_calc.update(gap);
            self.interframe_time_gap_stats_for_stats_packet.update(gap);
        }
        self.last_frame_received_time = Some(now);

        if self
            .interframe_time_gap_stats_for_jitter_calc
            .new_stats_available()
        {
            let desired = if self.config.dynamic_jitter_buffers {
                self.calculated_desired_jitter_buffer_frames()
            } else {
                1
            };
            self.buffer.set_desired_jitter_buffer_frames(desired);
            self.interframe_time_gap_stats_for_jitter_calc
                .clear_new_stats_available();
        }
    }

    /// Frames needed to ride out the largest arrival gap in the window.
    fn calculated_desired_jitter_buffer_frames(&self) -> usize {
        let window_max = self.interframe_time_gap_stats_for_jitter_calc.window_max();
        let frames = window_max.div_ceil(self.config.frame_duration_usecs) as usize;
        frames.max(1)
    }

    pub fn pop_frames(&mut self, num_frames: usize, starve_on_fail: bool) -> bool {
        self.buffer.pop_frames(num_frames, starve_on_fail)
    }

    pub fn pop_frames_into(
        &mut self,
        dest: &mut [Sample],
        num_frames: usize,
        starve_on_fail: bool,
    ) -> bool {
        self.buffer.pop_frames_into(dest, num_frames, starve_on_fail)
    }

    pub fn pop_frames_slices(
        &mut self,
        num_frames: usize,
        starve_on_fail: bool,
    ) -> Option<ReadSlices<'_, Sample>> {
        self.buffer.pop_frames_slices(num_frames, starve_on_fail)
    }

    pub fn is_starved(&self) -> bool {
        self.buffer.is_starved()
    }

    pub fn has_started(&self) -> bool {
        self.buffer.has_started()
    }

    pub fn desired_jitter_buffer_frames(&self) -> usize {
        self.buffer.desired_jitter_buffer_frames()
    }

    pub fn samples_available(&self) -> usize {
        self.buffer.ring_buffer().samples_available()
    }

    pub fn frames_available(&self) -> usize {
        self.buffer.frames_available()
    }

    pub fn frames_available_average(&self) -> f64 {
        self.buffer.frames_available_average()
    }

    pub fn starve_count(&self) -> u32 {
        self.buffer.starve_count()
    }

    pub fn consecutive_not_mixed_count(&self) -> u32 {
        self.buffer.consecutive_not_mixed_count()
    }

    pub fn silent_frames_dropped(&self) -> u64 {
        self.buffer.silent_frames_dropped()
    }

    pub fn audio_stream_stats(&self) -> AudioStreamStats {
        let gaps = &self.interframe_time_gap_stats_for_stats_packet;
        let sequence_stats = &self.incoming_sequence_number_stats;

        AudioStreamStats {
            time_gap_min: gaps.min(),
            time_gap_max: gaps.max(),
            time_gap_average: gaps.average(),
            time_gap_window_min: gaps.window_min(),
            time_gap_window_max: gaps.window_max(),
            time_gap_window_average: gaps.window_average(),

            frames_available: self.buffer.frames_available() as u32,
            frames_available_average: self.buffer.frames_available_average(),
            desired_jitter_buffer_frames: self.buffer.desired_jitter_buffer_frames() as u32,
            starve_count: self.buffer.starve_count(),
            consecutive_not_mixed_count: self.buffer.consecutive_not_mixed_count(),
            overflow_count: self.buffer.ring_buffer().overflow_count(),
            silent_frames_dropped: self.buffer.silent_frames_dropped(),

            packet_stream_stats: sequence_stats.stats(),
            packet_stream_window_stats: sequence_stats.stats_for_history_window(),
        }
    }

    /// Closes the current sequence-stats report period, then snapshots.
    pub fn update_seq_history_and_get_audio_stream_stats(&mut self) -> AudioStreamStats {
        self.incoming_sequence_number_stats.push_stats_to_history();
        self.audio_stream_stats()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::stream::clock::ManualClock;
    use crate::stream::config::WindowConfig;
    use crate::stream::format::{PacketType, PcmFormat, encode_pcm_body, encode_silent_body};

    const FRAME: usize = 10;
    const FRAME_USECS: u64 = 10_000;

    fn config() -> StreamConfig {
        StreamConfig {
            frame_samples: FRAME,
            frame_capacity: 16,
            frame_duration_usecs: FRAME_USECS,
            dynamic_jitter_buffers: true,
            jitter_calc_gaps: WindowConfig::new(4, 2),
            stats_gaps: WindowConfig::new(4, 4),
            frames_available_stats: WindowConfig::new(1000, 10),
            seq_history_len: 4,
        }
    }

    fn stream_with(config: StreamConfig) -> (InboundAudioStream<i16>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let stream = InboundAudioStream::new(
            config,
            Box::new(PcmFormat::<i16>::new(FRAME * 4)),
            clock.clone(),
        )
        .unwrap();
        (stream, clock)
    }

    fn sender() -> Uuid {
        Uuid::from_u128(0xa11ce)
    }

    fn body(seq: u16, value: i16) -> Vec<u8> {
        let mut body = Vec::new();
        encode_pcm_body(seq, &[value; FRAME], &mut body);
        body
    }

    fn ingest(stream: &mut InboundAudioStream<i16>, seq: u16, value: i16) -> usize {
        let body = body(seq, value);
        stream.parse_data(&AudioPacket::new(PacketType::MicrophoneAudio, sender(), &body))
    }

    #[test]
    fn test_rejects_invalid_config() {
        let clock = Arc::new(ManualClock::new());
        let bad = StreamConfig {
            frame_capacity: 0,
            ..config()
        };
        let result = InboundAudioStream::<i16>::new(bad, Box::new(PcmFormat::<i16>::new(8)), clock);
        assert!(result.is_err());
    }

    #[test]
    fn test_in_order_packets_fill_and_play() {
        let (mut stream, clock) = stream_with(config());
        assert!(stream.is_starved());

        let read = ingest(&mut stream, 0, 1);
        assert_eq!(read, 2 + 2 + FRAME * 2);
        assert!(!stream.is_starved(), "one frame meets the initial depth of one");

        for seq in 1..40u16 {
            clock.advance(Duration::from_micros(FRAME_USECS));
            ingest(&mut stream, seq, 1);
            assert!(stream.pop_frames(1, true));
        }
        assert_eq!(stream.frames_available(), 1);
        assert_eq!(stream.audio_stream_stats().packet_stream_stats.lost, 0);
        assert_eq!(stream.audio_stream_stats().packet_stream_stats.early, 0);
    }

    #[test]
    fn test_gap_is_filled_with_one_frame_of_silence() {
        let (mut stream, _clock) = stream_with(config());
        ingest(&mut stream, 0, 1);
        ingest(&mut stream, 1, 2);
        ingest(&mut stream, 3, 4);
        assert_eq!(stream.samples_available(), 4 * FRAME);

        let mut out = vec![0i16; 4 * FRAME];
        assert!(stream.pop_frames_into(&mut out, 4, false));
        assert!(out[..FRAME].iter().all(|&s| s == 1));
        assert!(out[FRAME..2 * FRAME].iter().all(|&s| s == 2));
        assert!(out[2 * FRAME..3 * FRAME].iter().all(|&s| s == 0), "gap filler");
        assert!(out[3 * FRAME..].iter().all(|&s| s == 4));
    }

    #[test]
    fn test_late_and_duplicate_are_discarded() {
        let (mut stream, _clock) = stream_with(config());
        ingest(&mut stream, 0, 1);
        ingest(&mut stream, 2, 3);
        let before = stream.samples_available();

        ingest(&mut stream, 1, 2);
        ingest(&mut stream, 2, 3);
        assert_eq!(stream.samples_available(), before);

        let stats = stream.audio_stream_stats().packet_stream_stats;
        assert_eq!(stats.late, 1);
        assert_eq!(stats.duplicate, 1);
        assert_eq!(stats.lost, 0);
    }

    #[test]
    fn test_truncated_packet_writes_nothing() {
        let (mut stream, _clock) = stream_with(config());
        let read = stream.parse_data(&AudioPacket::new(PacketType::MixedAudio, sender(), &[7]));
        assert_eq!(read, 0);
        assert_eq!(stream.samples_available(), 0);

        let read = stream.parse_data(&AudioPacket::new(PacketType::MixedAudio, sender(), &[0, 0]));
        assert_eq!(read, 2);
        assert_eq!(stream.samples_available(), 0);
        assert!(stream.is_starved());
    }

    #[test]
    fn test_depth_tracks_window_max_gap() {
        let (mut stream, clock) = stream_with(config());
        ingest(&mut stream, 0, 1);
        let gaps = [10_000u64, 10_000, 35_000, 10_000, 10_000, 10_000, 10_000, 10_000];
        for (i, gap) in gaps.iter().enumerate() {
            clock.advance(Duration::from_micros(*gap));
            ingest(&mut stream, i as u16 + 1, 1);
        }
        // worst gap 35ms over 10ms frames
        assert_eq!(stream.desired_jitter_buffer_frames(), 4);
    }

    #[test]
    fn test_depth_never_below_one_with_zero_gaps() {
        let (mut stream, _clock) = stream_with(config());
        for seq in 0..20u16 {
            ingest(&mut stream, seq, 1);
        }
        assert_eq!(stream.desired_jitter_buffer_frames(), 1);
    }

    #[test]
    fn test_depth_clamped_to_capacity() {
        let (mut stream, clock) = stream_with(config());
        ingest(&mut stream, 0, 1);
        for seq in 1..=4u16 {
            clock.advance(Duration::from_secs(5));
            ingest(&mut stream, seq, 1);
            assert!(stream.desired_jitter_buffer_frames() <= 15);
        }
        assert_eq!(stream.desired_jitter_buffer_frames(), 15);
    }

    #[test]
    fn test_static_depth_when_dynamic_disabled() {
        let (mut stream, clock) = stream_with(StreamConfig {
            dynamic_jitter_buffers: false,
            ..config()
        });
        ingest(&mut stream, 0, 1);
        for seq in 1..=8u16 {
            clock.advance(Duration::from_millis(50));
            ingest(&mut stream, seq, 1);
        }
        assert_eq!(stream.desired_jitter_buffer_frames(), 1);
    }

    #[test]
    fn test_starvation_and_recovery() {
        let (mut stream, _clock) = stream_with(config());
        ingest(&mut stream, 0, 1);
        assert!(stream.pop_frames(1, true));
        assert!(!stream.pop_frames(1, true));
        assert!(stream.is_starved());
        assert_eq!(stream.starve_count(), 1);
        assert_eq!(stream.consecutive_not_mixed_count(), 1);

        assert!(!stream.pop_frames(1, true));
        assert_eq!(stream.consecutive_not_mixed_count(), 2);

        ingest(&mut stream, 1, 1);
        assert!(!stream.is_starved());
        assert!(stream.pop_frames_slices(1, true).is_some());
        assert!(stream.has_started());
    }

    #[test]
    fn test_silent_frame_packets_feed_the_buffer() {
        let (mut stream, _clock) = stream_with(config());
        let mut body = Vec::new();
        encode_silent_body(0, (2 * FRAME) as u16, &mut body);
        let read =
            stream.parse_data(&AudioPacket::new(PacketType::SilentAudioFrame, sender(), &body));
        assert_eq!(read, 4);
        assert_eq!(stream.frames_available(), 2);
    }

    #[test]
    fn test_shrink_drops_gap_silence_once_window_settles() {
        let (mut stream, _clock) = stream_with(StreamConfig {
            frames_available_stats: WindowConfig::new(2, 2),
            ..config()
        });

        for seq in 0..8u16 {
            ingest(&mut stream, seq, 1);
        }
        assert_eq!(stream.frames_available(), 8);

        // seq 8 and 9 lost: two frames of filler, all droppable
        ingest(&mut stream, 10, 1);
        assert_eq!(stream.silent_frames_dropped(), 2);
        assert_eq!(stream.frames_available(), 9);
        assert_eq!(stream.audio_stream_stats().packet_stream_stats.lost, 2);
    }

    #[test]
    fn test_stats_snapshot_and_history() {
        let (mut stream, clock) = stream_with(config());
        for seq in [0u16, 1, 2, 5] {
            clock.advance(Duration::from_millis(10));
            ingest(&mut stream, seq, 1);
        }
        stream.pop_frames(2, false);

        let stats = stream.update_seq_history_and_get_audio_stream_stats();
        assert_eq!(stats.time_gap_min, 10_000);
        assert_eq!(stats.time_gap_max, 10_000);
        assert_eq!(stats.frames_available, 4);
        assert_eq!(stats.packet_stream_stats.received, 4);
        assert_eq!(stats.packet_stream_stats.lost, 2);
        assert_eq!(stats.packet_stream_window_stats, Default::default());

        ingest(&mut stream, 6, 1);
        let stats = stream.update_seq_history_and_get_audio_stream_stats();
        assert_eq!(stats.packet_stream_window_stats.received, 1);

        assert_eq!(stream.audio_stream_stats(), stats, "snapshot must not mutate");
    }

    #[test]
    fn test_reset() {
        let (mut stream, clock) = stream_with(config());
        for seq in 0..10u16 {
            clock.advance(Duration::from_millis(30));
            ingest(&mut stream, seq, 1);
        }
        stream.pop_frames(20, true);
        stream.reset();

        assert!(stream.is_starved());
        assert!(!stream.has_started());
        assert_eq!(stream.samples_available(), 0);
        assert_eq!(stream.desired_jitter_buffer_frames(), 1);
        assert_eq!(stream.audio_stream_stats(), AudioStreamStats::default());
    }

    #[test]
    fn test_available_samples_stay_bounded() {
        let (mut stream, clock) = stream_with(config());
        let capacity = 16 * FRAME;
        let mut seq = 0u16;
        for round in 0..300usize {
            clock.advance(Duration::from_micros((round as u64 * 7919) % 40_000));
            seq = seq.wrapping_add(1 + (round % 5 == 0) as u16 * 3);
            ingest(&mut stream, seq, 1);
            if round % 3 != 0 {
                stream.pop_frames(1 + round % 2, round % 4 == 0);
            }
            assert!(stream.samples_available() <= capacity);
            assert!(stream.desired_jitter_buffer_frames() >= 1);
            assert!(stream.desired_jitter_buffer_frames() <= 15);
        }
    }
}
