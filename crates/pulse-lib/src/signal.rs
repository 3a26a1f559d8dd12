use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One scalar PPG reading as delivered by the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    /// Capture time in milliseconds. Authoritative for interval math.
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            timestamp_ms,
        }
    }
}

/// Bounded FIFO of samples. Values and timestamps are evicted together,
/// so both views always have the same length.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    values: VecDeque<f64>,
    timestamps: VecDeque<i64>,
    capacity: usize,
}

impl SampleWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            timestamps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when the window is full.
    pub fn push(&mut self, sample: Sample) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
        self.values.push_back(sample.value);
        self.timestamps.push_back(sample.timestamp_ms);
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.timestamps.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Contiguous copy of the values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.timestamps.iter().copied().collect()
    }

    pub fn last(&self) -> Option<Sample> {
        match (self.values.back(), self.timestamps.back()) {
            (Some(&value), Some(&timestamp_ms)) => Some(Sample::new(value, timestamp_ms)),
            _ => None,
        }
    }
}

/// RR intervals in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn new(rr: Vec<f64>) -> Self {
        Self { rr }
    }

    /// Intervals between consecutive beat timestamps.
    pub fn from_beat_times(beats: &[i64]) -> Self {
        let rr = beats.windows(2).map(|w| w[1].saturating_sub(w[0]) as f64).collect();
        Self { rr }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }

    /// Mean of the last `n` intervals, if any exist.
    pub fn recent_mean(&self, n: usize) -> Option<f64> {
        if self.rr.is_empty() || n == 0 {
            return None;
        }
        let start = self.rr.len().saturating_sub(n);
        let recent = &self.rr[start..];
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }
}
