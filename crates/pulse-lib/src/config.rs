use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// How the band filters treat their delay lines between analysis cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Delay lines are zeroed before each pass over the window.
    #[default]
    Stateless,
    /// Delay lines carry over from the previous pass, so the recursion
    /// integrates overlapping windows across cycles.
    Carry,
}

/// Configurable parameters for the PPG pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal capture rate (Hz) used for filter design.
    pub sample_rate_hz: f64,
    /// Raw buffer capacity (samples).
    pub max_window_size: usize,
    /// Low-frequency band edges (Hz).
    pub lf_band: [f64; 2],
    /// High-frequency band edges (Hz).
    pub hf_band: [f64; 2],
    /// Raw samples required before band filtering runs.
    pub min_analysis_samples: usize,
    /// Envelope half-window (samples).
    pub envelope_window_size: usize,
    /// First distance-weighted smoothing half-width.
    pub smoothing_window_size: usize,
    /// Second distance-weighted smoothing half-width.
    pub averaging_window_size: usize,
    /// Full width of the local-maximum test around a peak candidate.
    pub peak_window_size: usize,
    /// Candidate must exceed `min + pct/100 * (max - min)` of the recent window.
    pub peak_threshold_percent: f64,
    /// Number of recent smoothed samples used for the adaptive threshold.
    pub peak_threshold_lookback: usize,
    /// Trailing moving-average width applied before peak detection.
    pub smoothing_ma_window: usize,
    /// Refractory period between accepted peaks.
    pub min_peak_distance_ms: i64,
    pub rri_min_ms: i64,
    pub rri_max_ms: i64,
    /// Accepted RR intervals kept for HRV.
    pub rri_buffer_size: usize,
    /// RR intervals needed before the RRI-derived amplitude proxies run.
    pub hrv_min_intervals: usize,
    pub filter_mode: FilterMode,
    /// Length of one measurement session.
    pub measure_seconds: u64,
    /// Cadence of the analysis cycle when replaying recorded streams.
    pub analysis_interval_ms: i64,
    /// Sensor ceiling; samples at or above it count as saturated.
    pub saturation_level: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30.0,
            max_window_size: 300,
            lf_band: [0.04, 0.15],
            hf_band: [0.15, 0.4],
            min_analysis_samples: 30,
            envelope_window_size: 30,
            smoothing_window_size: 15,
            averaging_window_size: 30,
            peak_window_size: 10,
            peak_threshold_percent: 55.0,
            peak_threshold_lookback: 30,
            smoothing_ma_window: 5,
            min_peak_distance_ms: 250,
            rri_min_ms: 300,
            rri_max_ms: 1500,
            rri_buffer_size: 100,
            hrv_min_intervals: 8,
            filter_mode: FilterMode::Stateless,
            measure_seconds: 60,
            analysis_interval_ms: 1000,
            saturation_level: 255.0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate_hz));
        }
        let windows = [
            ("max_window_size", self.max_window_size),
            ("envelope_window_size", self.envelope_window_size),
            ("smoothing_window_size", self.smoothing_window_size),
            ("averaging_window_size", self.averaging_window_size),
            ("peak_window_size", self.peak_window_size),
            ("peak_threshold_lookback", self.peak_threshold_lookback),
            ("smoothing_ma_window", self.smoothing_ma_window),
            ("rri_buffer_size", self.rri_buffer_size),
        ];
        if let Some(&(name, _)) = windows.iter().find(|(_, size)| *size == 0) {
            return Err(ConfigError::ZeroWindow { name });
        }
        let nyquist = self.sample_rate_hz / 2.0;
        for (name, [low, high]) in [("LF", self.lf_band), ("HF", self.hf_band)] {
            if !(low > 0.0 && low < high && high < nyquist) {
                return Err(ConfigError::InvalidBand {
                    name,
                    low,
                    high,
                    nyquist,
                });
            }
        }
        if !(self.peak_threshold_percent > 0.0 && self.peak_threshold_percent <= 100.0) {
            return Err(ConfigError::InvalidThreshold(self.peak_threshold_percent));
        }
        if self.rri_min_ms <= 0 || self.rri_min_ms > self.rri_max_ms {
            return Err(ConfigError::InvalidRriBounds {
                min: self.rri_min_ms,
                max: self.rri_max_ms,
            });
        }
        Ok(())
    }

    pub fn tunables(&self) -> Tunables {
        Tunables {
            envelope_window_size: self.envelope_window_size,
            smoothing_window_size: self.smoothing_window_size,
            averaging_window_size: self.averaging_window_size,
            peak_threshold_percent: self.peak_threshold_percent,
            min_peak_distance_ms: self.min_peak_distance_ms,
        }
    }

    /// Copy runtime tunables in place. Filter design is untouched.
    pub fn set_tunables(&mut self, tunables: &Tunables) {
        self.envelope_window_size = tunables.envelope_window_size;
        self.smoothing_window_size = tunables.smoothing_window_size;
        self.averaging_window_size = tunables.averaging_window_size;
        self.peak_threshold_percent = tunables.peak_threshold_percent;
        self.min_peak_distance_ms = tunables.min_peak_distance_ms;
    }
}

/// Parameters a user may change while a session is running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    pub envelope_window_size: usize,
    pub smoothing_window_size: usize,
    pub averaging_window_size: usize,
    pub peak_threshold_percent: f64,
    pub min_peak_distance_ms: i64,
}

impl Default for Tunables {
    fn default() -> Self {
        PipelineConfig::default().tunables()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(PipelineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let cfg = PipelineConfig {
            sample_rate_hz: 0.5,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBand { name: "HF", .. })
        ));
    }

    #[test]
    fn rejects_zero_windows_and_bad_threshold() {
        let cfg = PipelineConfig {
            smoothing_window_size: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroWindow {
                name: "smoothing_window_size"
            })
        );
        let cfg = PipelineConfig {
            peak_threshold_percent: 120.0,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidThreshold(120.0)));
    }

    #[test]
    fn rejects_inverted_rri_bounds() {
        let cfg = PipelineConfig {
            rri_min_ms: 1600,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidRriBounds { .. })
        ));
    }

    #[test]
    fn tunables_round_trip_through_config() {
        let mut cfg = PipelineConfig::default();
        let tunables = Tunables {
            envelope_window_size: 10,
            smoothing_window_size: 5,
            averaging_window_size: 10,
            peak_threshold_percent: 40.0,
            min_peak_distance_ms: 300,
        };
        cfg.set_tunables(&tunables);
        assert_eq!(cfg.tunables(), tunables);
        assert_eq!(cfg.sample_rate_hz, 30.0);
        assert_eq!(Tunables::default().envelope_window_size, 30);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"envelope_window_size": 12, "filter_mode": "carry"}"#)
                .expect("parse partial config");
        assert_eq!(cfg.envelope_window_size, 12);
        assert_eq!(cfg.filter_mode, FilterMode::Carry);
        assert_eq!(cfg.max_window_size, 300);
    }
}
