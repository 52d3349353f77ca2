use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body of the price suggestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PricePrediction {
    /// Suggested price, rounded to 2 decimals
    pub suggested_price: f64,
    /// Confidence score in [0.70, 0.99], rounded to 3 decimals
    pub ml_score: f64,
}

impl PricePrediction {
    pub fn new(price: f64, ml_score: f64) -> Self {
        Self {
            suggested_price: round_to(price, 2),
            ml_score: round_to(ml_score, 3),
        }
    }
}

/// Round to `decimals` places. Exact half steps such as 7.125 go to the
/// even neighbour (7.12).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Which artifact a fingerprint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Model,
    Imputer,
    Scaler,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactFingerprint {
    pub role: ArtifactRole,
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Static description of the loaded artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelInfo {
    pub objective: String,
    pub num_trees: usize,
    pub num_rounds: usize,
    pub num_features: usize,
    pub feature_names: Vec<String>,
    pub artifacts: Vec<ArtifactFingerprint>,
    pub loaded_at: DateTime<Utc>,
}

/// Body of the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceHealth {
    pub status: String,
    pub backend: String,
    pub model: ModelInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.345678, 2), 12.35);
        assert_eq!(round_to(0.87649, 3), 0.876);
        assert_eq!(round_to(-1.005001, 2), -1.01);
        assert_eq!(round_to(3.0, 2), 3.0);
    }

    #[test]
    fn test_round_to_exact_ties_go_to_even() {
        assert_eq!(round_to(7.125, 2), 7.12);
        assert_eq!(round_to(7.375, 2), 7.38);
        assert_eq!(round_to(0.8125, 3), 0.812);
        assert_eq!(round_to(-2.625, 2), -2.62);
        // 2.675 is stored just below the tie
        assert_eq!(round_to(2.675, 2), 2.67);
    }

    #[test]
    fn test_prediction_rounds_ties_to_even() {
        let prediction = PricePrediction::new(7.125, 0.8125);
        assert_eq!(prediction.suggested_price, 7.12);
        assert_eq!(prediction.ml_score, 0.812);
    }

    #[test]
    fn test_prediction_wire_format() {
        let prediction = PricePrediction::new(7.4567, 0.91234);
        let json = serde_json::to_value(prediction).unwrap();
        assert_eq!(json["suggestedPrice"], 7.46);
        assert_eq!(json["mlScore"], 0.912);
        assert_eq!(json.as_object().unwrap().len(), 2);
    }
}
