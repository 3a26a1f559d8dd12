use thiserror::Error;

/// Rejected pipeline configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
    #[error("{name} must be at least 1")]
    ZeroWindow { name: &'static str },
    #[error("{name} band [{low}, {high}] Hz is not a valid passband below Nyquist ({nyquist} Hz)")]
    InvalidBand {
        name: &'static str,
        low: f64,
        high: f64,
        nyquist: f64,
    },
    #[error("peak threshold percentage must be in (0, 100], got {0}")]
    InvalidThreshold(f64),
    #[error("RRI bounds [{min}, {max}] ms are inverted or empty")]
    InvalidRriBounds { min: i64, max: i64 },
}

/// Why a computation stage produced its fallback constants instead of data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FallbackReason {
    #[error("normalisation range [{min}, {max}] is not finite or empty")]
    DegenerateRange { min: f64, max: f64 },
    #[error("RR statistics are not finite (mean {mean}, sdnn {sdnn}, rmssd {rmssd})")]
    NonFiniteRrStats { mean: f64, sdnn: f64, rmssd: f64 },
}

/// Result of a stage that degrades instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Computed(T),
    Fallback(FallbackReason),
}

impl<T> Outcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback(_))
    }

    pub fn computed(self) -> Option<T> {
        match self {
            Outcome::Computed(value) => Some(value),
            Outcome::Fallback(_) => None,
        }
    }
}
