//! Sequence number tracking and packet loss detection.
//!
//! Classifies each arriving 16-bit sequence number relative to the next one
//! expected from the current sender, and keeps cumulative plus rolling
//! per-period counts for reporting.

use rkyv::Archive;
use tracing::{debug, info};
use uuid::Uuid;

use super::history::RingHistory;

/// How far behind the expected sequence number a packet may arrive and still
/// be recognised as late or duplicate. Anything older resynchronizes.
pub const RECENT_SEQUENCE_WINDOW: u16 = 1024;

const WINDOW_WORDS: usize = RECENT_SEQUENCE_WINDOW as usize / 64;

/// Signed circular difference `a - b` of two 16-bit sequence numbers.
///
/// The result lies in `[-32768, 32767]`: a value up to 32767 ahead of `b`
/// is positive, anything further is taken to have wrapped and is negative.
pub fn sequence_diff(a: u16, b: u16) -> i32 {
    let forward = (a as i32 - b as i32).rem_euclid(1 << 16);
    if forward > i16::MAX as i32 {
        forward - (1 << 16)
    } else {
        forward
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalStatus {
    OnTime,
    /// Ahead of the expected sequence number; the packets in between are
    /// presumed lost.
    Early,
    /// Behind the expected sequence number and filling a gap counted as lost.
    Late,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalInfo {
    pub status: ArrivalStatus,
    /// Signed distance from the expected sequence number. For `Early` this is
    /// the number of packets skipped.
    pub gap_from_expected: i32,
}

/// Packet counts for a sender, cumulative or over a history window.
#[derive(
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
)]
pub struct PacketStreamStats {
    pub received: u64,
    pub early: u64,
    pub late: u64,
    pub lost: u64,
    pub duplicate: u64,
    /// Times the expected sequence number was re-anchored after an arrival
    /// too far in the past.
    pub resyncs: u64,
}

impl PacketStreamStats {
    /// Fraction of expected packets that never arrived (0.0 to 1.0).
    pub fn lost_rate(&self) -> f64 {
        let expected = self.received.saturating_sub(self.duplicate) + self.lost;
        if expected == 0 {
            return 0.0;
        }
        self.lost as f64 / expected as f64
    }

    /// Counts accumulated since `older` was taken.
    pub fn since(&self, older: &PacketStreamStats) -> PacketStreamStats {
        PacketStreamStats {
            received: self.received.saturating_sub(older.received),
            early: self.early.saturating_sub(older.early),
            late: self.late.saturating_sub(older.late),
            lost: self.lost.saturating_sub(older.lost),
            duplicate: self.duplicate.saturating_sub(older.duplicate),
            resyncs: self.resyncs.saturating_sub(older.resyncs),
        }
    }
}

/// Per-sender sequence number classifier.
///
/// A bitmap over the last [`RECENT_SEQUENCE_WINDOW`] sequence numbers records
/// which ones are still missing, which is what separates a late arrival from a
/// duplicate. Everything is sized at construction.
pub struct SequenceNumberStats {
    sender: Option<Uuid>,
    expected_next: Option<u16>,
    /// Bit set = sequence number arrived (or predates tracking).
    arrived: [u64; WINDOW_WORDS],
    stats: PacketStreamStats,
    history: RingHistory<PacketStreamStats>,
}

impl SequenceNumberStats {
    /// `history_len` is the number of report periods the rolling window spans.
    pub fn new(history_len: usize) -> Self {
        Self {
            sender: None,
            expected_next: None,
            arrived: [u64::MAX; WINDOW_WORDS],
            stats: PacketStreamStats::default(),
            history: RingHistory::new(history_len + 1),
        }
    }

    pub fn reset(&mut self) {
        self.sender = None;
        self.expected_next = None;
        self.arrived = [u64::MAX; WINDOW_WORDS];
        self.stats = PacketStreamStats::default();
        self.history.clear();
    }

    pub fn expected_next(&self) -> Option<u16> {
        self.expected_next
    }

    fn slot(sequence: u16) -> (usize, u64) {
        let index = (sequence % RECENT_SEQUENCE_WINDOW) as usize;
        (index / 64, 1u64 << (index % 64))
    }

    fn has_arrived(&self, sequence: u16) -> bool {
        let (word, bit) = Self::slot(sequence);
        self.arrived[word] & bit != 0
    }

    fn mark(&mut self, sequence: u16, arrived: bool) {
        let (word, bit) = Self::slot(sequence);
        if arrived {
            self.arrived[word] |= bit;
        } else {
            self.arrived[word] &= !bit;
        }
    }

    /// Re-anchors on `sequence` with nothing considered missing.
    fn resync(&mut self, sequence: u16) {
        self.arrived = [u64::MAX; WINDOW_WORDS];
        self.expected_next = Some(sequence.wrapping_add(1));
    }

    /// Classifies an arriving packet and updates the counts.
    pub fn record_arrival(&mut self, sequence: u16, sender: Uuid) -> ArrivalInfo {
        if self.sender.is_some_and(|current| current != sender) {
            info!(
                "Sequence number stats reset: sender changed from {:?} to {}",
                self.sender, sender
            );
            self.reset();
        }
        self.sender = Some(sender);
        self.stats.received += 1;

        let Some(expected) = self.expected_next else {
            self.resync(sequence);
            return ArrivalInfo {
                status: ArrivalStatus::OnTime,
                gap_from_expected: 0,
            };
        };

        let diff = sequence_diff(sequence, expected);

        if diff == 0 {
            self.mark(sequence, true);
            self.expected_next = Some(sequence.wrapping_add(1));
            return ArrivalInfo {
                status: ArrivalStatus::OnTime,
                gap_from_expected: 0,
            };
        }

        if diff > 0 {
            let skipped = diff.min(RECENT_SEQUENCE_WINDOW as i32) as u16;
            for back in 1..=skipped {
                self.mark(sequence.wrapping_sub(back), false);
            }
            self.mark(sequence, true);
            self.expected_next = Some(sequence.wrapping_add(1));
            self.stats.early += 1;
            self.stats.lost += diff as u64;
            debug!(
                "Early packet: seq {} expected {}, {} presumed lost",
                sequence, expected, diff
            );
            return ArrivalInfo {
                status: ArrivalStatus::Early,
                gap_from_expected: diff,
            };
        }

        if -diff > RECENT_SEQUENCE_WINDOW as i32 {
            info!(
                "Sequence number {} is {} behind expected {}, resynchronizing",
                sequence, -diff, expected
            );
            self.stats.resyncs += 1;
            self.resync(sequence);
            return ArrivalInfo {
                status: ArrivalStatus::OnTime,
                gap_from_expected: 0,
            };
        }

        if self.has_arrived(sequence) {
            self.stats.duplicate += 1;
            ArrivalInfo {
                status: ArrivalStatus::Duplicate,
                gap_from_expected: diff,
            }
        } else {
            self.mark(sequence, true);
            self.stats.late += 1;
            self.stats.lost = self.stats.lost.saturating_sub(1);
            ArrivalInfo {
                status: ArrivalStatus::Late,
                gap_from_expected: diff,
            }
        }
    }

    /// Closes the current report period.
    pub fn push_stats_to_history(&mut self) {
        self.history.push(self.stats);
    }

    /// Cumulative counts since construction, reset or sender change.
    pub fn stats(&self) -> PacketStreamStats {
        self.stats
    }

    /// Counts over the report periods currently held in history.
    pub fn stats_for_history_window(&self) -> PacketStreamStats {
        match (self.history.newest(), self.history.oldest()) {
            (Some(newest), Some(oldest)) => newest.since(oldest),
            _ => PacketStreamStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Uuid {
        Uuid::from_u128(0x5eed)
    }

    #[test]
    fn test_sequence_diff_half_range() {
        assert_eq!(sequence_diff(5, 5), 0);
        assert_eq!(sequence_diff(6, 5), 1);
        assert_eq!(sequence_diff(4, 5), -1);
        assert_eq!(sequence_diff(0, u16::MAX), 1);
        assert_eq!(sequence_diff(u16::MAX, 0), -1);
        assert_eq!(sequence_diff(32767, 0), 32767);
        assert_eq!(sequence_diff(32768, 0), -32768);
        assert_eq!(sequence_diff(40000, 0), 40000 - 65536);
    }

    #[test]
    fn test_in_order_is_on_time() {
        let mut tracker = SequenceNumberStats::new(30);
        for seq in 0..2000u16 {
            let info = tracker.record_arrival(seq, sender());
            assert_eq!(info.status, ArrivalStatus::OnTime, "seq {seq}");
        }
        assert_eq!(tracker.stats().received, 2000);
        assert_eq!(tracker.stats().lost, 0);
    }

    #[test]
    fn test_wraparound_is_on_time() {
        let mut tracker = SequenceNumberStats::new(30);
        let start = u16::MAX - 3;
        for i in 0..8u16 {
            let info = tracker.record_arrival(start.wrapping_add(i), sender());
            assert_eq!(info.status, ArrivalStatus::OnTime);
        }
        assert_eq!(tracker.expected_next(), Some(5));
    }

    #[test]
    fn test_gap_is_early_with_count() {
        let mut tracker = SequenceNumberStats::new(30);
        tracker.record_arrival(0, sender());
        tracker.record_arrival(1, sender());
        let info = tracker.record_arrival(4, sender());
        assert_eq!(info.status, ArrivalStatus::Early);
        assert_eq!(info.gap_from_expected, 2);
        assert_eq!(tracker.stats().lost, 2);
        assert_eq!(tracker.expected_next(), Some(5));
    }

    #[test]
    fn test_late_then_duplicate() {
        let mut tracker = SequenceNumberStats::new(30);
        tracker.record_arrival(10, sender());
        tracker.record_arrival(12, sender());

        let late = tracker.record_arrival(11, sender());
        assert_eq!(late.status, ArrivalStatus::Late);
        assert_eq!(late.gap_from_expected, -2);
        assert_eq!(tracker.stats().lost, 0, "late arrival recovers the loss");

        let again = tracker.record_arrival(11, sender());
        assert_eq!(again.status, ArrivalStatus::Duplicate);

        let repeat = tracker.record_arrival(12, sender());
        assert_eq!(repeat.status, ArrivalStatus::Duplicate);
        assert_eq!(tracker.stats().duplicate, 2);
        assert_eq!(tracker.expected_next(), Some(13));
    }

    #[test]
    fn test_far_behind_resynchronizes() {
        let mut tracker = SequenceNumberStats::new(30);
        tracker.record_arrival(5000, sender());
        let info = tracker.record_arrival(100, sender());
        assert_eq!(info.status, ArrivalStatus::OnTime);
        assert_eq!(tracker.expected_next(), Some(101));
        assert_eq!(tracker.stats().resyncs, 1);

        let next = tracker.record_arrival(101, sender());
        assert_eq!(next.status, ArrivalStatus::OnTime);
    }

    #[test]
    fn test_sender_change_resets() {
        let mut tracker = SequenceNumberStats::new(30);
        tracker.record_arrival(7, sender());
        tracker.record_arrival(9, sender());
        let info = tracker.record_arrival(300, Uuid::from_u128(0xbeef));
        assert_eq!(info.status, ArrivalStatus::OnTime);
        assert_eq!(tracker.stats().received, 1);
        assert_eq!(tracker.stats().lost, 0);
    }

    #[test]
    fn test_history_window() {
        let mut tracker = SequenceNumberStats::new(2);
        assert_eq!(tracker.stats_for_history_window(), PacketStreamStats::default());

        tracker.push_stats_to_history();
        for seq in [0u16, 1, 3] {
            tracker.record_arrival(seq, sender());
        }
        tracker.push_stats_to_history();
        for seq in [4u16, 5] {
            tracker.record_arrival(seq, sender());
        }
        tracker.push_stats_to_history();

        let window = tracker.stats_for_history_window();
        assert_eq!(window.received, 5);
        assert_eq!(window.lost, 1);

        tracker.record_arrival(6, sender());
        tracker.push_stats_to_history();
        let window = tracker.stats_for_history_window();
        assert_eq!(window.received, 3, "oldest period should have rolled out");
        assert_eq!(window.lost, 0);
    }

    #[test]
    fn test_lost_rate() {
        let stats = PacketStreamStats {
            received: 9,
            lost: 1,
            ..Default::default()
        };
        assert!((stats.lost_rate() - 0.1).abs() < 1e-9);
        assert_eq!(PacketStreamStats::default().lost_rate(), 0.0);
    }
}
