//! Bounded rolling window of inter-arrival gaps

use std::collections::VecDeque;

/// Number of gaps kept per channel
pub const INTERVAL_CAPACITY: usize = 200;

/// Most-recent-N buffer of millisecond gaps, used for jitter.
#[derive(Debug, Clone)]
pub struct IntervalBuffer {
    gaps: VecDeque<f64>,
    capacity: usize,
}

impl Default for IntervalBuffer {
    fn default() -> Self {
        Self::new(INTERVAL_CAPACITY)
    }
}

impl IntervalBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            gaps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a gap, evicting the oldest one when full.
    ///
    /// Negative or non-finite gaps are ignored.
    pub fn record(&mut self, gap_ms: f64) {
        if !gap_ms.is_finite() || gap_ms < 0.0 {
            return;
        }
        if self.gaps.len() == self.capacity {
            self.gaps.pop_front();
        }
        self.gaps.push_back(gap_ms);
    }

    /// Sample standard deviation (n - 1); 0 with fewer than two gaps.
    pub fn std_dev(&self) -> f64 {
        let n = self.gaps.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.gaps.iter().sum::<f64>() / n as f64;
        let variance = self
            .gaps
            .iter()
            .map(|g| (g - mean) * (g - mean))
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.gaps.clear();
    }

    /// Gaps in insertion order, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.gaps.iter()
    }
}
