use anyhow::{Context, Result};
use rkyv::Archive;

use crate::stats::PacketStreamStats;

/// Point-in-time diagnostics for one inbound stream.
///
/// Sent to the remote side as a stats packet (rkyv) and logged as JSON.
#[derive(
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Default,
    PartialEq,
)]
pub struct AudioStreamStats {
    /// Inter-arrival gaps in microseconds, lifetime.
    pub time_gap_min: u64,
    pub time_gap_max: u64,
    pub time_gap_average: f64,
    /// Inter-arrival gaps in microseconds, last closed window.
    pub time_gap_window_min: u64,
    pub time_gap_window_max: u64,
    pub time_gap_window_average: f64,

    pub frames_available: u32,
    pub frames_available_average: f64,
    pub desired_jitter_buffer_frames: u32,
    pub starve_count: u32,
    pub consecutive_not_mixed_count: u32,
    pub overflow_count: u64,
    pub silent_frames_dropped: u64,

    pub packet_stream_stats: PacketStreamStats,
    pub packet_stream_window_stats: PacketStreamStats,
}

impl AudioStreamStats {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .context("Serialization error")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        rkyv::from_bytes::<AudioStreamStats, rkyv::rancor::Error>(bytes)
            .context("Deserialization error")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode stream stats as JSON")
    }
}
