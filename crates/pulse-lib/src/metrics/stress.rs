use serde::{Deserialize, Serialize};
use std::fmt;

/// LFiA value splitting the quadrant plane.
pub const LF_CENTER: f64 = 30.0;
/// HFiA value splitting the quadrant plane.
pub const HF_CENTER: f64 = 25.0;

/// Autonomic state read off the (LFiA, HFiA) plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressQuadrant {
    Rest,
    LightPhysicalStress,
    DeepRelaxation,
    LightMentalStress,
}

impl StressQuadrant {
    /// Centre values are inclusive on the "high" side.
    pub fn classify(lfia: f64, hfia: f64) -> Self {
        match (lfia >= LF_CENTER, hfia >= HF_CENTER) {
            (false, false) => StressQuadrant::Rest,
            (true, false) => StressQuadrant::LightPhysicalStress,
            (false, true) => StressQuadrant::DeepRelaxation,
            (true, true) => StressQuadrant::LightMentalStress,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StressQuadrant::Rest => "Rest",
            StressQuadrant::LightPhysicalStress => "Light physical stress",
            StressQuadrant::DeepRelaxation => "Deep relaxation",
            StressQuadrant::LightMentalStress => "Light mental stress",
        }
    }
}

impl fmt::Display for StressQuadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Replace missing or non-finite amplitudes with the quadrant centres.
pub fn substitute_defaults(lfia: Option<f64>, hfia: Option<f64>) -> (f64, f64) {
    (
        lfia.filter(|v| v.is_finite()).unwrap_or(LF_CENTER),
        hfia.filter(|v| v.is_finite()).unwrap_or(HF_CENTER),
    )
}
