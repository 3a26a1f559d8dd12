//! Band-limiting and smoothing primitives shared by the pipeline stages.

use crate::config::FilterMode;
use log::debug;
use std::f64::consts::{PI, SQRT_2};

/// Below this the least-squares design matrix is treated as singular.
const DETREND_EPSILON: f64 = 1e-10;

/// Subtract the arithmetic mean.
pub fn center(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    data.iter().map(|x| x - mean).collect()
}

/// Remove the least-squares line fitted against sample index.
///
/// Fewer than three samples, or a degenerate design matrix, leave the
/// input unchanged.
pub fn detrend(data: &[f64]) -> Vec<f64> {
    match linear_fit(data) {
        Some((slope, intercept)) => data
            .iter()
            .enumerate()
            .map(|(i, &y)| y - (slope * i as f64 + intercept))
            .collect(),
        None => data.to_vec(),
    }
}

fn linear_fit(data: &[f64]) -> Option<(f64, f64)> {
    let n = data.len();
    if n < 3 {
        return None;
    }
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (i, &y) in data.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n_f = n as f64;
    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom.abs() < DETREND_EPSILON {
        debug!("detrend skipped: singular fit over {} samples", n);
        return None;
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    Some((slope, intercept))
}

/// Trailing moving average; the first samples average over what exists.
pub fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out.push(acc / (i + 1).min(win) as f64);
    }
    out
}

/// Symmetric moving average with weights `1 - |i-j| / (half + 1)`.
pub fn weighted_smooth(data: &[f64], half: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || half == 0 {
        return data.to_vec();
    }
    let denom = (half + 1) as f64;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half).min(n - 1);
            let mut acc = 0.0;
            let mut weight_sum = 0.0;
            for (j, &value) in data.iter().enumerate().take(end + 1).skip(start) {
                let weight = 1.0 - i.abs_diff(j) as f64 / denom;
                acc += weight * value;
                weight_sum += weight;
            }
            acc / weight_sum
        })
        .collect()
}

/// Which side of the cut-off a biquad passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    HighPass,
    LowPass,
}

/// Second-order Butterworth section (direct form I) with its own delay lines.
#[derive(Debug, Clone)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 3],
    x: [f64; 3],
    y: [f64; 2],
}

impl Biquad {
    /// Bilinear-transform design with tangent pre-warping of `cutoff_hz`.
    pub fn design(kind: StageKind, cutoff_hz: f64, fs: f64) -> Self {
        let wc = (PI * cutoff_hz / fs).tan();
        let k = SQRT_2 * wc;
        let v = wc * wc;
        let a = [1.0 + k + v, 2.0 * (v - 1.0), 1.0 - k + v];
        let b = match kind {
            StageKind::LowPass => [v, 2.0 * v, v],
            StageKind::HighPass => [1.0, -2.0, 1.0],
        };
        Self {
            b,
            a,
            x: [0.0; 3],
            y: [0.0; 2],
        }
    }

    pub fn reset(&mut self) {
        self.x = [0.0; 3];
        self.y = [0.0; 2];
    }

    pub fn step(&mut self, input: f64) -> f64 {
        self.x[2] = self.x[1];
        self.x[1] = self.x[0];
        self.x[0] = input;
        let acc = self.b[0] * self.x[0] + self.b[1] * self.x[1] + self.b[2] * self.x[2]
            - self.a[1] * self.y[0]
            - self.a[2] * self.y[1];
        let out = acc / self.a[0];
        self.y[1] = self.y[0];
        self.y[0] = out;
        out
    }

    pub fn is_at_rest(&self) -> bool {
        self.x.iter().chain(self.y.iter()).all(|v| *v == 0.0)
    }
}

/// High-pass at the lower band edge followed by low-pass at the upper edge.
#[derive(Debug, Clone)]
pub struct Bandpass {
    low_cut: Biquad,
    high_cut: Biquad,
}

impl Bandpass {
    pub fn new(low_hz: f64, high_hz: f64, fs: f64) -> Self {
        Self {
            low_cut: Biquad::design(StageKind::HighPass, low_hz, fs),
            high_cut: Biquad::design(StageKind::LowPass, high_hz, fs),
        }
    }

    pub fn reset(&mut self) {
        self.low_cut.reset();
        self.high_cut.reset();
    }

    pub fn is_at_rest(&self) -> bool {
        self.low_cut.is_at_rest() && self.high_cut.is_at_rest()
    }

    pub fn process(&mut self, signal: &[f64]) -> Vec<f64> {
        let intermediate: Vec<f64> = signal.iter().map(|&x| self.low_cut.step(x)).collect();
        intermediate
            .into_iter()
            .map(|x| self.high_cut.step(x))
            .collect()
    }
}

/// LF and HF band signals of one analysis cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandSignals {
    pub lf: Vec<f64>,
    pub hf: Vec<f64>,
}

/// Two independent bandpass filters over the centred, detrended window.
#[derive(Debug, Clone)]
pub struct FilterBank {
    lf: Bandpass,
    hf: Bandpass,
    mode: FilterMode,
}

impl FilterBank {
    pub fn new(lf_band: [f64; 2], hf_band: [f64; 2], fs: f64, mode: FilterMode) -> Self {
        Self {
            lf: Bandpass::new(lf_band[0], lf_band[1], fs),
            hf: Bandpass::new(hf_band[0], hf_band[1], fs),
            mode,
        }
    }

    pub fn reset(&mut self) {
        self.lf.reset();
        self.hf.reset();
    }

    pub fn is_at_rest(&self) -> bool {
        self.lf.is_at_rest() && self.hf.is_at_rest()
    }

    pub fn split(&mut self, raw: &[f64]) -> BandSignals {
        if self.mode == FilterMode::Stateless {
            self.reset();
        }
        let prepared = detrend(&center(raw));
        BandSignals {
            lf: self.lf.process(&prepared),
            hf: self.hf.process(&prepared),
        }
    }
}
