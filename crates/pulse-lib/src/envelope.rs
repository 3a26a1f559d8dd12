use crate::filters::weighted_smooth;
use log::debug;

/// Share of the peak magnitude in the raw envelope blend.
const MAX_WEIGHT: f64 = 0.7;
/// Share of the trimmed mean in the raw envelope blend.
const MEAN_WEIGHT: f64 = 0.3;
/// Fraction trimmed from each end before averaging.
const TRIM_FRACTION: f64 = 0.2;

/// Window sizes used by [`instantaneous_amplitude`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeParams {
    /// Half-width of the max / trimmed-mean window.
    pub window: usize,
    /// Half-width of the first weighted smoothing pass.
    pub smoothing: usize,
    /// Half-width of the second weighted smoothing pass.
    pub averaging: usize,
}

impl EnvelopeParams {
    /// Both band signals must hold this many samples before extraction runs.
    pub fn min_samples(&self) -> usize {
        2 * self.window
    }
}

/// Instantaneous amplitude of a band signal: a 0.7·max + 0.3·trimmed-mean
/// blend over a symmetric window, then two distance-weighted smoothing passes.
pub fn instantaneous_amplitude(signal: &[f64], params: &EnvelopeParams) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let half = params.window.min(n / 2);
    debug!(
        "envelope over {} samples (half-window {}, smoothing {}, averaging {})",
        n, half, params.smoothing, params.averaging
    );

    let magnitudes: Vec<f64> = signal.iter().map(|x| x.abs()).collect();
    let mut window = Vec::with_capacity(2 * half + 1);
    let raw: Vec<f64> = (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half).min(n - 1);
            window.clear();
            window.extend_from_slice(&magnitudes[start..=end]);
            window_envelope(&mut window)
        })
        .collect();

    let smoothed = weighted_smooth(&raw, params.smoothing);
    weighted_smooth(&smoothed, params.averaging)
}

fn window_envelope(window: &mut [f64]) -> f64 {
    let max_val = window.iter().copied().fold(0.0, f64::max);
    window.sort_by(|a, b| a.total_cmp(b));
    let trim = (window.len() as f64 * TRIM_FRACTION).floor() as usize;
    let kept = &window[trim..window.len() - trim];
    let mean_val = if kept.is_empty() {
        0.0
    } else {
        kept.iter().sum::<f64>() / kept.len() as f64
    };
    MAX_WEIGHT * max_val + MEAN_WEIGHT * mean_val
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn params() -> EnvelopeParams {
        EnvelopeParams {
            window: 30,
            smoothing: 15,
            averaging: 30,
        }
    }

    #[test]
    fn envelope_is_never_negative() {
        let signal: Vec<f64> = (0..300)
            .map(|i| {
                let t = i as f64 / 30.0;
                -3.0 + 2.0 * (2.0 * PI * 0.1 * t).sin() - 0.5 * (2.0 * PI * 0.3 * t).cos()
            })
            .collect();
        let env = instantaneous_amplitude(&signal, &params());
        assert_eq!(env.len(), signal.len());
        assert!(env.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn constant_magnitude_gives_constant_envelope() {
        let signal: Vec<f64> = (0..120)
            .map(|i| if i % 2 == 0 { 2.0 } else { -2.0 })
            .collect();
        let env = instantaneous_amplitude(&signal, &params());
        assert!(env.iter().all(|v| (v - 2.0).abs() < 1e-9));
    }

    #[test]
    fn window_blend_uses_trimmed_mean() {
        // 10 values: trim 2 from each end, mean of 3..=8 is 5.5
        let mut window: Vec<f64> = (1..=10).map(f64::from).collect();
        let value = window_envelope(&mut window);
        assert!((value - (0.7 * 10.0 + 0.3 * 5.5)).abs() < 1e-12);
    }

    #[test]
    fn tiny_inputs_are_handled() {
        assert!(instantaneous_amplitude(&[], &params()).is_empty());
        let single = instantaneous_amplitude(&[-4.0], &params());
        assert_eq!(single.len(), 1);
        assert!((single[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn min_samples_is_twice_the_window() {
        assert_eq!(params().min_samples(), 60);
    }
}
