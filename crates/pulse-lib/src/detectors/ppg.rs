use crate::{config::PipelineConfig, filters::moving_average, signal::RRSeries};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Nominal frame spacing used to turn the refractory period into samples.
const NOMINAL_FRAME_MS: i64 = 30;

/// Parameters of the streaming beat detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakDetectorConfig {
    /// Trailing moving-average width applied to the raw window.
    pub smoothing_window: usize,
    /// Full width of the local-maximum neighbourhood.
    pub peak_window_size: usize,
    /// Adaptive threshold as a fraction of the recent range.
    pub threshold_fraction: f64,
    /// Recent smoothed samples inspected for the threshold.
    pub threshold_lookback: usize,
    pub min_peak_distance_ms: i64,
    pub rri_min_ms: i64,
    pub rri_max_ms: i64,
    /// Accepted intervals (and beat times) retained.
    pub history: usize,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PeakDetectorConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            smoothing_window: cfg.smoothing_ma_window,
            peak_window_size: cfg.peak_window_size,
            threshold_fraction: cfg.peak_threshold_percent / 100.0,
            threshold_lookback: cfg.peak_threshold_lookback,
            min_peak_distance_ms: cfg.min_peak_distance_ms,
            rri_min_ms: cfg.rri_min_ms,
            rri_max_ms: cfg.rri_max_ms,
            history: cfg.rri_buffer_size,
        }
    }
}

impl PeakDetectorConfig {
    pub fn accepts_rri(&self, rri_ms: i64) -> bool {
        rri_ms >= self.rri_min_ms && rri_ms <= self.rri_max_ms
    }

    /// Half-width (samples) of the non-maximum suppression scan.
    fn suppression_radius(&self) -> usize {
        (self.min_peak_distance_ms / NOMINAL_FRAME_MS).max(0) as usize
    }
}

/// What one evaluation of the detector produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub timestamp_ms: i64,
    /// Interval to the previous beat when it passed the plausibility bounds.
    pub rri_ms: Option<i64>,
}

/// Streaming local-maximum beat detector over the smoothed raw window.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    cfg: PeakDetectorConfig,
    peaks: VecDeque<i64>,
    last_peak_ms: Option<i64>,
    rri: VecDeque<f64>,
    beat_count: usize,
}

impl PeakDetector {
    pub fn new(cfg: PeakDetectorConfig) -> Self {
        Self {
            cfg,
            peaks: VecDeque::new(),
            last_peak_ms: None,
            rri: VecDeque::new(),
            beat_count: 0,
        }
    }

    pub fn config(&self) -> &PeakDetectorConfig {
        &self.cfg
    }

    /// Swap parameters without discarding accepted beats.
    pub fn set_config(&mut self, cfg: PeakDetectorConfig) {
        self.cfg = cfg;
    }

    pub fn reset(&mut self) {
        self.peaks.clear();
        self.last_peak_ms = None;
        self.rri.clear();
        self.beat_count = 0;
    }

    pub fn beat_count(&self) -> usize {
        self.beat_count
    }

    pub fn peaks(&self) -> Vec<i64> {
        self.peaks.iter().copied().collect()
    }

    pub fn last_peak_ms(&self) -> Option<i64> {
        self.last_peak_ms
    }

    pub fn rri_series(&self) -> RRSeries {
        RRSeries::new(self.rri.iter().copied().collect())
    }

    pub fn rri_len(&self) -> usize {
        self.rri.len()
    }

    /// Test the confirmed candidate behind the tail of the window.
    ///
    /// `values` and `timestamps` are the raw window, oldest first.
    pub fn evaluate(&mut self, values: &[f64], timestamps: &[i64]) -> Option<BeatEvent> {
        let n = values.len().min(timestamps.len());
        let half = self.cfg.peak_window_size / 2;
        if n <= self.cfg.peak_window_size || n < half + 2 {
            return None;
        }
        let idx = n - half - 1;
        let smoothed = moving_average(&values[..n], self.cfg.smoothing_window);
        let candidate = smoothed[idx];

        if !is_local_max(&smoothed, idx, half) {
            return None;
        }

        let lookback = self.cfg.threshold_lookback.min(n);
        let recent = &smoothed[n - lookback..];
        let (lo, hi) = recent
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let threshold = lo + self.cfg.threshold_fraction * (hi - lo);
        if candidate <= threshold {
            trace!(
                "candidate {:.3} below adaptive threshold {:.3}",
                candidate,
                threshold
            );
            return None;
        }

        let timestamp_ms = timestamps[idx];
        if let Some(last) = self.last_peak_ms {
            let since_last = timestamp_ms.saturating_sub(last);
            if since_last <= self.cfg.min_peak_distance_ms {
                trace!(
                    "candidate at {} ms inside refractory period ({} ms since last beat)",
                    timestamp_ms,
                    since_last
                );
                return None;
            }
        }

        let radius = self.cfg.suppression_radius();
        let start = idx.saturating_sub(radius);
        let end = (idx + radius).min(n - 1);
        if smoothed[start..=end].iter().any(|&v| v > candidate) {
            trace!("candidate at {} ms suppressed by a larger neighbour", timestamp_ms);
            return None;
        }

        Some(self.accept(timestamp_ms))
    }

    fn accept(&mut self, timestamp_ms: i64) -> BeatEvent {
        let previous = self.peaks.back().copied();
        self.peaks.push_back(timestamp_ms);
        if self.peaks.len() > self.cfg.history {
            self.peaks.pop_front();
        }
        self.last_peak_ms = Some(timestamp_ms);
        self.beat_count += 1;

        let rri_ms = previous
            .map(|prev| timestamp_ms.saturating_sub(prev))
            .filter(|&rri| self.cfg.accepts_rri(rri));
        if let Some(rri) = rri_ms {
            self.rri.push_back(rri as f64);
            if self.rri.len() > self.cfg.history {
                self.rri.pop_front();
            }
        }
        debug!(
            "beat #{} at {} ms (rri {:?})",
            self.beat_count, timestamp_ms, rri_ms
        );
        BeatEvent {
            timestamp_ms,
            rri_ms,
        }
    }
}

fn is_local_max(data: &[f64], idx: usize, half: usize) -> bool {
    let centre = data[idx];
    (1..=half).all(|offset| {
        let left = idx.checked_sub(offset).map(|i| data[i]);
        let right = data.get(idx + offset).copied();
        left.map_or(true, |v| centre > v) && right.map_or(true, |v| centre > v)
    })
}
