use crate::error::{FallbackReason, Outcome};
use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Heart rate is averaged over this many of the newest intervals.
pub const HEART_RATE_INTERVALS: usize = 5;
pub const MIN_HEART_RATE_BPM: i64 = 40;
pub const MAX_HEART_RATE_BPM: i64 = 200;

/// Time-domain HRV summary; all values in milliseconds except `pnn50`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    /// Population standard deviation of the intervals.
    pub sdnn: f64,
    pub rmssd: f64,
    /// Fraction of successive differences above 50 ms.
    pub pnn50: f64,
}

pub fn hrv_time(rr: &RRSeries) -> HRVTime {
    let n = rr.rr.len();
    let avnn = if n > 0 {
        rr.rr.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let sdnn = if n > 1 {
        (rr.rr.iter().map(|x| (x - avnn).powi(2)).sum::<f64>() / n as f64).sqrt()
    } else {
        0.0
    };
    let rmssd = if n > 1 {
        let diffs = rr.rr.windows(2).map(|w| (w[1] - w[0]).powi(2));
        (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let pnn50 = if n > 1 {
        let count = rr
            .rr
            .windows(2)
            .filter(|w| (w[1] - w[0]).abs() > 50.0)
            .count();
        count as f64 / (n as f64 - 1.0)
    } else {
        0.0
    };

    HRVTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}

/// LFiA / HFiA stand-ins derived from RR variability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeProxies {
    pub lfia: f64,
    pub hfia: f64,
    pub hrv: HRVTime,
}

/// `lfia = clamp(SDNN/3, 10, 60)`, `hfia = clamp(RMSSD/5, 5, 50)`.
///
/// `None` until `min_intervals` RR intervals are available.
pub fn rri_amplitude_proxies(
    rr: &RRSeries,
    min_intervals: usize,
) -> Option<Outcome<AmplitudeProxies>> {
    if rr.len() < min_intervals.max(2) {
        return None;
    }
    let hrv = hrv_time(rr);
    if !(hrv.avnn.is_finite() && hrv.sdnn.is_finite() && hrv.rmssd.is_finite()) {
        return Some(Outcome::Fallback(FallbackReason::NonFiniteRrStats {
            mean: hrv.avnn,
            sdnn: hrv.sdnn,
            rmssd: hrv.rmssd,
        }));
    }
    Some(Outcome::Computed(AmplitudeProxies {
        lfia: (hrv.sdnn / 3.0).clamp(10.0, 60.0),
        hfia: (hrv.rmssd / 5.0).clamp(5.0, 50.0),
        hrv,
    }))
}

/// `round(60000 / mean(last 5 RRIs))`, only when it lands in 40..=200 BPM.
pub fn heart_rate_bpm(rr: &RRSeries) -> Option<i64> {
    let mean = rr.recent_mean(HEART_RATE_INTERVALS)?;
    if mean <= 0.0 {
        return None;
    }
    let bpm = (60_000.0 / mean).round() as i64;
    (MIN_HEART_RATE_BPM..=MAX_HEART_RATE_BPM)
        .contains(&bpm)
        .then_some(bpm)
}

/// Ratio of mean squared LF to mean squared HF band values.
pub fn band_power_ratio(lf: &[f64], hf: &[f64]) -> f64 {
    let power = |data: &[f64]| {
        let valid: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
        if valid.is_empty() {
            None
        } else {
            Some(valid.iter().map(|v| v * v).sum::<f64>() / valid.len() as f64)
        }
    };
    match (power(lf), power(hf)) {
        (Some(lf_power), Some(hf_power)) if hf_power != 0.0 => lf_power / hf_power,
        _ => 0.0,
    }
}
