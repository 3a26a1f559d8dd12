use crate::signal::RRSeries;
use realfft::RealFftPlanner;

/// Signal quality of the current raw window. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SQIResult {
    pub std_dev: f64,
    pub saturation_ratio: f64,
    pub spike_ratio: f64,
    pub spectral_entropy: f64,
    pub rr_cv: f64,
}

impl SQIResult {
    pub fn is_flat(&self) -> bool {
        self.std_dev <= 1e-6
    }

    pub fn is_acceptable(&self) -> bool {
        !self.is_flat() && self.saturation_ratio < 0.5 && self.rr_cv <= 0.2
    }
}

pub fn compute_std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Fraction of samples at or above the sensor ceiling.
pub fn compute_saturation_ratio(data: &[f64], saturation_level: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let saturated = data.iter().filter(|&&v| v >= saturation_level).count();
    saturated as f64 / data.len() as f64
}

pub fn compute_rr_cv(rr: &RRSeries) -> f64 {
    if rr.rr.is_empty() {
        return 0.0;
    }
    let mean = rr.rr.iter().sum::<f64>() / rr.rr.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    compute_std_dev(&rr.rr) / mean
}

/// Shannon entropy (bits) of the normalised power spectrum of the centred window.
pub fn compute_spectral_entropy(data: &[f64]) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<f64> = data.iter().map(|x| x - mean).collect();
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buffer, &mut spectrum).is_err() {
        return 0.0;
    }
    let powers: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();
    let total_power: f64 = powers.iter().sum();
    if total_power == 0.0 || !total_power.is_finite() {
        return 0.0;
    }
    powers
        .into_iter()
        .filter(|p| *p > 0.0)
        .map(|p| {
            let p = p / total_power;
            -p * p.log2()
        })
        .sum()
}

/// Share of successive differences beyond mean + 2·sd of all differences.
pub fn compute_spike_ratio(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = data.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let sd = compute_std_dev(&diffs);
    if sd == 0.0 {
        return 0.0;
    }
    let threshold = mean + 2.0 * sd;
    let spikes = diffs.iter().filter(|&&d| d > threshold).count();
    spikes as f64 / diffs.len() as f64
}

pub fn evaluate_sqi(values: &[f64], rr: &RRSeries, saturation_level: f64) -> SQIResult {
    SQIResult {
        std_dev: compute_std_dev(values),
        saturation_ratio: compute_saturation_ratio(values, saturation_level),
        spike_ratio: compute_spike_ratio(values),
        spectral_entropy: compute_spectral_entropy(values),
        rr_cv: compute_rr_cv(rr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn flat_window_is_not_acceptable() {
        let sqi = evaluate_sqi(&[120.0; 60], &RRSeries::default(), 255.0);
        assert!(sqi.is_flat());
        assert!(!sqi.is_acceptable());
        assert_eq!(sqi.spectral_entropy, 0.0);
        assert_eq!(sqi.spike_ratio, 0.0);
    }

    #[test]
    fn saturated_samples_are_counted() {
        let data = [255.0, 255.0, 200.0, 254.9];
        assert!((compute_saturation_ratio(&data, 255.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn clean_pulse_is_acceptable() {
        let data: Vec<f64> = (0..300)
            .map(|i| 150.0 + 10.0 * (2.0 * PI * i as f64 / 30.0).sin())
            .collect();
        let rr = RRSeries::new(vec![1000.0, 990.0, 1010.0]);
        let sqi = evaluate_sqi(&data, &rr, 255.0);
        assert!(sqi.is_acceptable());
        assert!(sqi.spectral_entropy < 1.0);
    }

    #[test]
    fn rr_cv_zero_when_constant() {
        let rr = RRSeries::new(vec![800.0, 800.0, 800.0]);
        assert!(compute_rr_cv(&rr).abs() < 1e-12);
    }

    #[test]
    fn single_spike_is_detected() {
        let mut data = vec![100.0; 50];
        data[25] = 180.0;
        assert!(compute_spike_ratio(&data) > 0.0);
    }
}
