//! Timing and sequence statistics for inbound streams.
//!
//! - [`MovingMinMaxAvg`] - Windowed min/max/average with an interval-closed flag
//! - [`SequenceNumberStats`] - Arrival classification and loss accounting
//! - [`RingHistory`] - Fixed-capacity history shared by both

pub mod history;
pub mod min_max_avg;
pub mod sequence;

pub use history::RingHistory;
pub use min_max_avg::{MinMaxAvg, MovingMinMaxAvg};
pub use sequence::{
    ArrivalInfo, ArrivalStatus, PacketStreamStats, SequenceNumberStats, sequence_diff,
};
