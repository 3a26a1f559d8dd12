use crate::filters::BandSignals;
use crate::metrics::hrv::{band_power_ratio, hrv_time, HRVTime};
use crate::metrics::stress::StressQuadrant;
use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Minimum sample time between two frame-rate checkpoints.
const FPS_CHECKPOINT_MS: i64 = 1000;
/// Frame-rate readings averaged into the reported value.
const FPS_READINGS: usize = 5;

/// Effective capture rate derived from sample timestamps.
#[derive(Debug, Clone, Default)]
pub struct FrameRateTracker {
    checkpoint_ms: Option<i64>,
    frames: u32,
    readings: VecDeque<i64>,
}

impl FrameRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp_ms: i64) {
        let Some(checkpoint) = self.checkpoint_ms else {
            self.checkpoint_ms = Some(timestamp_ms);
            return;
        };
        self.frames += 1;
        let elapsed = timestamp_ms.saturating_sub(checkpoint);
        if elapsed >= FPS_CHECKPOINT_MS {
            let fps = (self.frames as f64 * 1000.0 / elapsed as f64).round() as i64;
            self.readings.push_back(fps);
            if self.readings.len() > FPS_READINGS {
                self.readings.pop_front();
            }
            self.checkpoint_ms = Some(timestamp_ms);
            self.frames = 0;
        }
    }

    /// Rounded mean of the recent readings.
    pub fn fps(&self) -> Option<i64> {
        if self.readings.is_empty() {
            return None;
        }
        let sum: i64 = self.readings.iter().sum();
        Some((sum as f64 / self.readings.len() as f64).round() as i64)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fixed-length measurement clock started by the first sample.
#[derive(Debug, Clone)]
pub struct MeasurementTimer {
    duration_ms: i64,
    started_ms: Option<i64>,
}

impl MeasurementTimer {
    pub fn new(measure_seconds: u64) -> Self {
        Self {
            duration_ms: measure_seconds.saturating_mul(1000).min(i64::MAX as u64) as i64,
            started_ms: None,
        }
    }

    /// Start the clock on the first observed timestamp.
    pub fn observe(&mut self, timestamp_ms: i64) {
        self.started_ms.get_or_insert(timestamp_ms);
    }

    pub fn started_ms(&self) -> Option<i64> {
        self.started_ms
    }

    /// Whole seconds left, rounded up. The full duration before the start.
    pub fn remaining_seconds(&self, now_ms: i64) -> u64 {
        let elapsed = self
            .started_ms
            .map_or(0, |start| now_ms.saturating_sub(start).max(0));
        let remaining = (self.duration_ms - elapsed).max(0) as u64;
        remaining.div_ceil(1000)
    }

    pub fn is_complete(&self, now_ms: i64) -> bool {
        self.started_ms
            .is_some_and(|start| now_ms.saturating_sub(start) >= self.duration_ms)
    }

    pub fn reset(&mut self) {
        self.started_ms = None;
    }
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub mean_lfia: f64,
    pub mean_hfia: f64,
    pub mean_heart_rate: f64,
    /// mean(LF²) / mean(HF²) of the last band arrays.
    pub lf_hf_ratio: f64,
    pub stress: StressQuadrant,
    pub stress_label: String,
    pub beat_count: usize,
    pub rri_count: usize,
    pub hrv: HRVTime,
}

/// Per-cycle values accumulated for the summary.
#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    lfia: Vec<f64>,
    hfia: Vec<f64>,
    heart_rates: Vec<f64>,
    bands: BandSignals,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_amplitudes(&mut self, lfia: f64, hfia: f64) {
        self.lfia.push(lfia);
        self.hfia.push(hfia);
    }

    pub fn record_heart_rate(&mut self, bpm: i64) {
        self.heart_rates.push(bpm as f64);
    }

    pub fn record_bands(&mut self, bands: &BandSignals) {
        self.bands.clone_from(bands);
    }

    pub fn cycles(&self) -> usize {
        self.lfia.len()
    }

    pub fn summarize(&self, beat_count: usize, rri: &RRSeries) -> SessionSummary {
        let mean_lfia = positive_mean(&self.lfia);
        let mean_hfia = positive_mean(&self.hfia);
        let stress = StressQuadrant::classify(mean_lfia, mean_hfia);
        SessionSummary {
            mean_lfia,
            mean_hfia,
            mean_heart_rate: positive_mean(&self.heart_rates),
            lf_hf_ratio: band_power_ratio(&self.bands.lf, &self.bands.hf),
            stress,
            stress_label: stress.label().to_string(),
            beat_count,
            rri_count: rri.len(),
            hrv: hrv_time(rri),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Mean over finite, strictly positive values; 0 when there are none.
fn positive_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite() && **v > 0.0)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
