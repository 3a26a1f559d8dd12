use crate::error::{FallbackReason, Outcome};
use log::debug;
use serde::{Deserialize, Serialize};

/// Valid samples required before percentiles replace the default range.
const MIN_VALID_SAMPLES: usize = 6;
const LOWER_PERCENTILE: f64 = 0.05;
const UPPER_PERCENTILE: f64 = 0.95;
/// Narrowest range allowed between the robust min and max.
const MIN_SPAN: f64 = 0.1;
/// Weight of the freshly computed range when blending with memory.
const BLEND_NEW: f64 = 0.3;

/// Fixed characteristics of one band's display scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandScale {
    /// Output is mapped into `[0, ceiling]`.
    pub ceiling: f64,
    /// Substituted for non-finite samples and on stage fallback.
    pub fallback: f64,
    /// Range used when too few valid samples exist.
    pub default_range: (f64, f64),
}

impl BandScale {
    pub const LF: BandScale = BandScale {
        ceiling: 60.0,
        fallback: 30.0,
        default_range: (0.1, 2.0),
    };

    pub const HF: BandScale = BandScale {
        ceiling: 50.0,
        fallback: 25.0,
        default_range: (0.05, 1.5),
    };
}

/// Smoothed robust range carried between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationMemory {
    pub min: f64,
    pub max: f64,
}

/// Maps one band's raw envelope onto its bounded display scale.
#[derive(Debug, Clone)]
pub struct AmplitudeNormalizer {
    scale: BandScale,
    memory: Option<NormalizationMemory>,
}

impl AmplitudeNormalizer {
    pub fn new(scale: BandScale) -> Self {
        Self {
            scale,
            memory: None,
        }
    }

    pub fn lf() -> Self {
        Self::new(BandScale::LF)
    }

    pub fn hf() -> Self {
        Self::new(BandScale::HF)
    }

    pub fn memory(&self) -> Option<NormalizationMemory> {
        self.memory
    }

    pub fn reset(&mut self) {
        self.memory = None;
    }

    /// Rescale `envelope` into `[0, ceiling]`, updating the range memory.
    pub fn normalize(&mut self, envelope: &[f64]) -> Outcome<Vec<f64>> {
        let (min, max) = enforce_min_span(robust_range(envelope, self.scale.default_range));
        let blended = match self.memory {
            Some(prev) => NormalizationMemory {
                min: BLEND_NEW * min + (1.0 - BLEND_NEW) * prev.min,
                max: BLEND_NEW * max + (1.0 - BLEND_NEW) * prev.max,
            },
            None => NormalizationMemory { min, max },
        };
        let span = blended.max - blended.min;
        if !(blended.min.is_finite() && blended.max.is_finite() && span > 0.0) {
            return Outcome::Fallback(FallbackReason::DegenerateRange {
                min: blended.min,
                max: blended.max,
            });
        }
        self.memory = Some(blended);
        debug!(
            "normalising {} samples into [0, {}] with range [{:.4}, {:.4}]",
            envelope.len(),
            self.scale.ceiling,
            blended.min,
            blended.max
        );

        let ceiling = self.scale.ceiling;
        let values = envelope
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    ((v - blended.min) / span * ceiling).clamp(0.0, ceiling)
                } else {
                    self.scale.fallback
                }
            })
            .collect();
        Outcome::Computed(values)
    }

    /// The buffer written when normalisation falls back.
    pub fn fallback_buffer(&self, len: usize) -> Vec<f64> {
        vec![self.scale.fallback; len]
    }
}

/// 5th/95th percentile of the finite, positive values, or `default` when
/// fewer than six such values exist.
fn robust_range(values: &[f64], default: (f64, f64)) -> (f64, f64) {
    let mut valid: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if valid.len() < MIN_VALID_SAMPLES {
        return default;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    (
        percentile(&valid, LOWER_PERCENTILE),
        percentile(&valid, UPPER_PERCENTILE),
    )
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn enforce_min_span((min, max): (f64, f64)) -> (f64, f64) {
    if max - min < MIN_SPAN {
        let mid = (min + max) / 2.0;
        (mid - MIN_SPAN / 2.0, mid + MIN_SPAN / 2.0)
    } else {
        (min, max)
    }
}
