use crate::filters::{center, detrend, moving_average};

/// Below this many samples the display trace is the raw buffer.
const MIN_TRACE_SAMPLES: usize = 11;
/// Robust z-score beyond which a sample is replaced by the median.
const MAD_THRESHOLD: f64 = 3.0;

/// Cleaned copy of the raw window for display.
pub fn display_trace(raw: &[f64]) -> Vec<f64> {
    if raw.len() < MIN_TRACE_SAMPLES {
        return raw.to_vec();
    }
    let smoothed = moving_average(raw, 5);
    let detrended = detrend(&center(&smoothed));
    let cleaned = replace_outliers(&detrended, MAD_THRESHOLD);
    moving_average(&cleaned, 3)
}

/// Replace samples whose robust z-score exceeds `threshold` with the median.
/// A zero MAD is treated as one.
pub fn replace_outliers(data: &[f64], threshold: f64) -> Vec<f64> {
    let Some(med) = median(data) else {
        return Vec::new();
    };
    let deviations: Vec<f64> = data.iter().map(|v| (v - med).abs()).collect();
    let mad = median(&deviations).filter(|m| *m != 0.0).unwrap_or(1.0);
    data.iter()
        .map(|&v| if (v - med).abs() / mad > threshold { med } else { v })
        .collect()
}

pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
