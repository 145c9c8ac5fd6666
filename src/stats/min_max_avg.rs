//! Sliding-window min/max/average tracking.
//!
//! [`MovingMinMaxAvg`] keeps lifetime aggregates plus aggregates over the last
//! `window_intervals` completed intervals of `interval_length` samples each.
//! Window statistics only change when an interval completes, and each
//! completion raises a flag the consumer clears after acting on it. That
//! flag is what limits depth re-estimation and silence dropping to once per
//! interval instead of once per packet.

use num_traits::{Bounded, ToPrimitive, Zero};

use super::history::RingHistory;

/// Min, max and running average of a set of samples.
#[derive(Debug, Clone, Copy)]
pub struct MinMaxAvg<T> {
    min: T,
    max: T,
    average: f64,
    samples: u64,
}

impl<T: Copy + PartialOrd + Bounded + ToPrimitive + Zero> MinMaxAvg<T> {
    pub fn new() -> Self {
        Self {
            min: T::max_value(),
            max: T::min_value(),
            average: 0.0,
            samples: 0,
        }
    }

    pub fn update(&mut self, value: T) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        let value = value.to_f64().unwrap_or(0.0);
        self.average = (self.average * self.samples as f64 + value) / (self.samples + 1) as f64;
        self.samples += 1;
    }

    /// Folds another set of statistics into this one, weighting averages by
    /// sample count.
    pub fn merge(&mut self, other: &MinMaxAvg<T>) {
        if other.samples == 0 {
            return;
        }
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
        let total = self.samples + other.samples;
        self.average = (self.average * self.samples as f64 + other.average * other.samples as f64)
            / total as f64;
        self.samples = total;
    }

    /// Smallest sample seen, or zero if there are none.
    pub fn min(&self) -> T {
        if self.samples == 0 { T::zero() } else { self.min }
    }

    /// Largest sample seen, or zero if there are none.
    pub fn max(&self) -> T {
        if self.samples == 0 { T::zero() } else { self.max }
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<T: Copy + PartialOrd + Bounded + ToPrimitive + Zero> Default for MinMaxAvg<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MovingMinMaxAvg<T> {
    interval_length: usize,
    overall: MinMaxAvg<T>,
    current_interval: MinMaxAvg<T>,
    samples_in_current_interval: usize,
    intervals: RingHistory<MinMaxAvg<T>>,
    window: MinMaxAvg<T>,
    new_stats_available: bool,
}

impl<T: Copy + PartialOrd + Bounded + ToPrimitive + Zero> MovingMinMaxAvg<T> {
    pub fn new(interval_length: usize, window_intervals: usize) -> Self {
        Self {
            interval_length,
            overall: MinMaxAvg::new(),
            current_interval: MinMaxAvg::new(),
            samples_in_current_interval: 0,
            intervals: RingHistory::new(window_intervals),
            window: MinMaxAvg::new(),
            new_stats_available: false,
        }
    }

    pub fn update(&mut self, value: T) {
        self.overall.update(value);
        self.current_interval.update(value);
        self.samples_in_current_interval += 1;

        if self.samples_in_current_interval >= self.interval_length {
            self.intervals.push(self.current_interval);
            self.current_interval.reset();
            self.samples_in_current_interval = 0;

            self.window.reset();
            for interval in self.intervals.iter() {
                self.window.merge(interval);
            }
            self.new_stats_available = true;
        }
    }

    pub fn reset(&mut self) {
        self.overall.reset();
        self.current_interval.reset();
        self.samples_in_current_interval = 0;
        self.intervals.clear();
        self.window.reset();
        self.new_stats_available = false;
    }

    pub fn min(&self) -> T {
        self.overall.min()
    }

    pub fn max(&self) -> T {
        self.overall.max()
    }

    pub fn average(&self) -> f64 {
        self.overall.average()
    }

    pub fn window_min(&self) -> T {
        self.window.min()
    }

    pub fn window_max(&self) -> T {
        self.window.max()
    }

    pub fn window_average(&self) -> f64 {
        self.window.average()
    }

    /// Set once each time an interval completes.
    pub fn new_stats_available(&self) -> bool {
        self.new_stats_available
    }

    pub fn clear_new_stats_available(&mut self) {
        self.new_stats_available = false;
    }

    /// True once the window spans its full number of completed intervals.
    pub fn is_window_filled(&self) -> bool {
        self.intervals.is_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_stats() {
        let mut stats = MovingMinMaxAvg::<u64>::new(4, 2);
        for value in [5, 1, 9, 3] {
            stats.update(value);
        }
        assert_eq!(stats.min(), 1);
        assert_eq!(stats.max(), 9);
        assert!((stats.average() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_window_only_reports_closed_intervals() {
        let mut stats = MovingMinMaxAvg::<u64>::new(3, 2);
        stats.update(10);
        stats.update(20);
        assert!(!stats.new_stats_available());
        assert_eq!(stats.window_max(), 0, "no interval has closed yet");

        stats.update(30);
        assert!(stats.new_stats_available());
        assert_eq!(stats.window_min(), 10);
        assert_eq!(stats.window_max(), 30);
        assert!((stats.window_average() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_stats_flag_is_edge_triggered() {
        let mut stats = MovingMinMaxAvg::<u64>::new(2, 2);
        stats.update(1);
        stats.update(1);
        assert!(stats.new_stats_available());
        stats.clear_new_stats_available();

        stats.update(1);
        assert!(!stats.new_stats_available(), "flag must stay clear mid-interval");
        stats.update(1);
        assert!(stats.new_stats_available());
    }

    #[test]
    fn test_window_slides() {
        let mut stats = MovingMinMaxAvg::<usize>::new(2, 2);
        for value in [100, 100, 1, 2, 3, 4] {
            stats.update(value);
        }
        assert!(stats.is_window_filled());
        assert_eq!(stats.window_max(), 4, "first interval should have slid out");
        assert_eq!(stats.window_min(), 1);
        assert!((stats.window_average() - 2.5).abs() < 1e-9);
        assert_eq!(stats.max(), 100);
    }

    #[test]
    fn test_window_filled_and_reset() {
        let mut stats = MovingMinMaxAvg::<usize>::new(1, 3);
        stats.update(1);
        stats.update(2);
        assert!(!stats.is_window_filled());
        stats.update(3);
        assert!(stats.is_window_filled());

        stats.reset();
        assert!(!stats.is_window_filled());
        assert!(!stats.new_stats_available());
        assert_eq!(stats.max(), 0);
    }
}
