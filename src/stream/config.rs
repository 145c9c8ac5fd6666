//! Configuration for inbound audio streams.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Samples per network frame at 24 kHz mono.
const DEFAULT_FRAME_SAMPLES: usize = 512;
const DEFAULT_FRAME_CAPACITY: usize = 100;
/// 512 samples at 24 kHz.
const DEFAULT_FRAME_DURATION_USECS: u64 = 21_333;
/// Frames arrive roughly this many times per second.
const FRAMES_PER_SECOND: usize = 47;
const DEFAULT_SEQ_HISTORY_LEN: usize = 30;

/// Shape of a [`MovingMinMaxAvg`](crate::stats::MovingMinMaxAvg) window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub interval_samples: usize,
    pub window_intervals: usize,
}

impl WindowConfig {
    pub const fn new(interval_samples: usize, window_intervals: usize) -> Self {
        Self {
            interval_samples,
            window_intervals,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Samples per frame, all channels included.
    pub frame_samples: usize,
    /// Ring buffer capacity in frames.
    pub frame_capacity: usize,
    /// Nominal playback duration of one frame.
    pub frame_duration_usecs: u64,
    /// Size the buffer from observed arrival gaps; otherwise hold one frame.
    pub dynamic_jitter_buffers: bool,
    /// Inter-arrival gaps used to estimate the desired depth.
    pub jitter_calc_gaps: WindowConfig,
    /// Inter-arrival gaps reported in the stats snapshot.
    pub stats_gaps: WindowConfig,
    /// Buffer occupancy driving silent frame dropping.
    pub frames_available_stats: WindowConfig,
    /// Report periods kept in the sequence number history.
    pub seq_history_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_samples: DEFAULT_FRAME_SAMPLES,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            frame_duration_usecs: DEFAULT_FRAME_DURATION_USECS,
            dynamic_jitter_buffers: true,
            jitter_calc_gaps: WindowConfig::new(100, 10),
            stats_gaps: WindowConfig::new(FRAMES_PER_SECOND, 30),
            frames_available_stats: WindowConfig::new(FRAMES_PER_SECOND, 10),
            seq_history_len: DEFAULT_SEQ_HISTORY_LEN,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_samples == 0 {
            anyhow::bail!("frame_samples must be non-zero");
        }
        if self.frame_capacity < 2 {
            anyhow::bail!(
                "frame_capacity must be at least 2 frames, got {}",
                self.frame_capacity
            );
        }
        if self.frame_duration_usecs == 0 {
            anyhow::bail!("frame_duration_usecs must be non-zero");
        }
        for (name, window) in [
            ("jitter_calc_gaps", self.jitter_calc_gaps),
            ("stats_gaps", self.stats_gaps),
            ("frames_available_stats", self.frames_available_stats),
        ] {
            if window.interval_samples == 0 || window.window_intervals == 0 {
                anyhow::bail!(
                    "{} needs non-zero interval and window sizes, got {:?}",
                    name,
                    window
                );
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid stream config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stream config {}", path.display()))?;
        Self::from_json_str(&json)
    }
}
