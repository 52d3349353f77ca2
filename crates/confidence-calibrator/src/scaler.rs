//! Confidence Scaler
//!
//! Single-column scalers exported from the offline fit as JSON, tagged by
//! `kind`. Parameters keep their array shape (one entry per column) so the
//! export is a straight dump of the fitted attributes.

use pricing_core::{PricingError, PricingResult, ScoreScaler};
use serde::{Deserialize, Serialize};

const ARTIFACT: &str = "scaler";

/// Fitted scaler for the log inverse tree spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfidenceScaler {
    MinMax(MinMaxScaler),
    Standard(StandardScaler),
}

/// Maps `[data_min, data_max]` linearly onto `feature_range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    pub feature_range: [f64; 2],
    #[serde(default)]
    pub clip: bool,
}

/// Centers on `mean` and divides by `scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

fn default_feature_range() -> [f64; 2] {
    [0.0, 1.0]
}

/// Zero-width ranges and zero scales divide by one instead.
fn non_zero(value: f64) -> f64 {
    if value == 0.0 {
        1.0
    } else {
        value
    }
}

fn single(values: &[f64], field: &str) -> PricingResult<f64> {
    match values {
        [v] if v.is_finite() => Ok(*v),
        [_] => Err(PricingError::invalid(ARTIFACT, format!("{field} is not finite"))),
        _ => Err(PricingError::invalid(
            ARTIFACT,
            format!("{field} must hold exactly one column, got {}", values.len()),
        )),
    }
}

impl MinMaxScaler {
    pub fn new(data_min: f64, data_max: f64) -> Self {
        Self {
            data_min: vec![data_min],
            data_max: vec![data_max],
            feature_range: default_feature_range(),
            clip: false,
        }
    }

    fn validate(&self) -> PricingResult<()> {
        let min = single(&self.data_min, "data_min")?;
        let max = single(&self.data_max, "data_max")?;
        if min > max {
            return Err(PricingError::invalid(
                ARTIFACT,
                format!("data_min {min} exceeds data_max {max}"),
            ));
        }
        let [lo, hi] = self.feature_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(PricingError::invalid(
                ARTIFACT,
                format!("invalid feature_range [{lo}, {hi}]"),
            ));
        }
        Ok(())
    }

    fn apply(&self, value: f64) -> f64 {
        let [lo, hi] = self.feature_range;
        let scale = (hi - lo) / non_zero(self.data_max[0] - self.data_min[0]);
        let offset = lo - self.data_min[0] * scale;
        let scaled = value * scale + offset;
        if self.clip {
            scaled.clamp(lo, hi)
        } else {
            scaled
        }
    }
}

impl StandardScaler {
    pub fn new(mean: f64, scale: f64) -> Self {
        Self {
            mean: vec![mean],
            scale: vec![scale],
        }
    }

    fn validate(&self) -> PricingResult<()> {
        single(&self.mean, "mean")?;
        single(&self.scale, "scale")?;
        Ok(())
    }

    fn apply(&self, value: f64) -> f64 {
        (value - self.mean[0]) / non_zero(self.scale[0])
    }
}

impl ConfidenceScaler {
    /// Parse and validate a scaler export.
    pub fn from_json(bytes: &[u8]) -> PricingResult<Self> {
        let scaler: ConfidenceScaler = serde_json::from_slice(bytes)
            .map_err(|e| PricingError::invalid(ARTIFACT, e.to_string()))?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn validate(&self) -> PricingResult<()> {
        match self {
            ConfidenceScaler::MinMax(s) => s.validate(),
            ConfidenceScaler::Standard(s) => s.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConfidenceScaler::MinMax(_) => "min_max",
            ConfidenceScaler::Standard(_) => "standard",
        }
    }
}

impl ScoreScaler for ConfidenceScaler {
    fn transform(&self, value: f64) -> PricingResult<f64> {
        let scaled = match self {
            ConfidenceScaler::MinMax(s) => s.apply(value),
            ConfidenceScaler::Standard(s) => s.apply(value),
        };
        if scaled.is_finite() {
            Ok(scaled)
        } else {
            Err(PricingError::Inference(format!(
                "scaler produced non-finite output for {value}"
            )))
        }
    }
}
