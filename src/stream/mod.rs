//! Inbound stream handling: packet parsing, the per-sender jitter buffer
//! controller, and the registry that owns one controller per sender.
//!
//! # Key Types
//!
//! - [`InboundAudioStream`] - Adaptive jitter buffer for one remote source
//! - [`StreamRegistry`] - Routes packets to per-sender streams and mixes playout
//! - [`StreamFormat`] - Property and codec parsing, chosen per stream type
//! - [`AudioStreamStats`] - Diagnostic snapshot, serializable for the wire

pub mod clock;
pub mod config;
pub mod format;
pub mod inbound;
pub mod packet;
pub mod registry;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StreamConfig, WindowConfig};
pub use format::{AudioSink, PacketType, PcmFormat, StreamFormat, StreamProperties};
pub use inbound::InboundAudioStream;
pub use packet::AudioPacket;
pub use registry::{FormatFactory, StreamRegistry};
pub use stats::AudioStreamStats;
