//! Receive side of a real-time audio stream.
//!
//! Packets arrive with a 16-bit sequence number, possibly late, reordered,
//! duplicated or not at all. [`InboundAudioStream`] turns them into a steady
//! frame-by-frame playout: gaps are filled with silence, buffer depth follows
//! the observed arrival jitter, and excess latency is shed by dropping
//! synthesized silence rather than real audio.

pub mod audio;
pub mod stats;
pub mod stream;

pub use audio::{AudioRingBuffer, AudioSample, JitterBuffer, ReadSlices};
pub use stats::{ArrivalStatus, MovingMinMaxAvg, PacketStreamStats, SequenceNumberStats};
pub use stream::{
    AudioPacket, AudioStreamStats, InboundAudioStream, PacketType, PcmFormat, StreamConfig,
    StreamRegistry, SystemClock,
};
