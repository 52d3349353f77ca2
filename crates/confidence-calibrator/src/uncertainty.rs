//! Uncertainty Estimation Module
//!
//! The ensemble is scored one boosting round at a time; how much the rounds
//! disagree is the uncertainty signal. Low spread means high confidence.

use pricing_core::{PricingError, PricingResult, ScoreScaler};
use statrs::statistics::Statistics;
use std::sync::Arc;

/// Added to the spread before inverting so identical trees stay finite.
pub const SPREAD_EPSILON: f64 = 1e-6;

pub const ML_SCORE_FLOOR: f64 = 0.70;
pub const ML_SCORE_CEILING: f64 = 0.99;

/// Concave reshaping: rises quickly off the floor, flattens near the ceiling.
pub const ML_SCORE_EXPONENT: f64 = 0.3;

/// Intermediate values of one confidence computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceEstimate {
    /// Population standard deviation of per-round margins
    pub std_dev: f64,
    /// ln(1 + 1 / (std_dev + eps))
    pub log_inv_std: f64,
    /// Scaler output, clamped to [0, 1]
    pub confidence_norm: f64,
    /// Final score in [0.70, 0.99]
    pub ml_score: f64,
}

/// Population standard deviation (ddof = 0) of the per-round predictions.
pub fn tree_spread(tree_margins: &[f64]) -> PricingResult<f64> {
    if tree_margins.is_empty() {
        return Err(PricingError::Inference(
            "no tree predictions to measure spread".into(),
        ));
    }
    let std_dev = tree_margins.iter().population_std_dev();
    if std_dev.is_finite() {
        Ok(std_dev)
    } else {
        Err(PricingError::Inference(format!(
            "tree spread is not finite ({std_dev})"
        )))
    }
}

/// `ln(1 + 1 / (std_dev + eps))`: inverse spread, log-compressed.
pub fn inverse_spread_signal(std_dev: f64) -> f64 {
    let inv_std = 1.0 / (std_dev + SPREAD_EPSILON);
    inv_std.ln_1p()
}

/// Map a normalized confidence onto the reported score range.
///
/// Inputs outside [0, 1] are clamped first; a negative base would make the
/// fractional power undefined.
pub fn ml_score(confidence_norm: f64) -> f64 {
    let x = confidence_norm.clamp(0.0, 1.0);
    ML_SCORE_FLOOR + x.powf(ML_SCORE_EXPONENT) * (ML_SCORE_CEILING - ML_SCORE_FLOOR)
}

/// Scores tree disagreement with a scaler fitted on training-time signals.
#[derive(Clone)]
pub struct ConfidenceCalibrator {
    scaler: Arc<dyn ScoreScaler>,
}

impl ConfidenceCalibrator {
    pub fn new(scaler: Arc<dyn ScoreScaler>) -> Self {
        Self { scaler }
    }

    pub fn estimate(&self, tree_margins: &[f64]) -> PricingResult<ConfidenceEstimate> {
        let std_dev = tree_spread(tree_margins)?;
        let log_inv_std = inverse_spread_signal(std_dev);
        let scaled = self.scaler.transform(log_inv_std)?;
        if scaled.is_nan() {
            return Err(PricingError::Inference("scaled confidence is NaN".into()));
        }
        let confidence_norm = scaled.clamp(0.0, 1.0);
        if confidence_norm != scaled {
            tracing::debug!(
                "Confidence {:.4} outside scaler range, clamped to {:.1}",
                scaled,
                confidence_norm
            );
        }

        Ok(ConfidenceEstimate {
            std_dev,
            log_inv_std,
            confidence_norm,
            ml_score: ml_score(confidence_norm),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaler::{ConfidenceScaler, MinMaxScaler};

    fn calibrator(min: f64, max: f64) -> ConfidenceCalibrator {
        ConfidenceCalibrator::new(Arc::new(ConfidenceScaler::MinMax(MinMaxScaler::new(
            min, max,
        ))))
    }

    #[test]
    fn test_tree_spread_is_population_std() {
        let spread = tree_spread(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((spread - 2.0).abs() < 1e-12);
        assert_eq!(tree_spread(&[3.5]).unwrap(), 0.0);
        assert!(tree_spread(&[]).is_err());
    }

    #[test]
    fn test_identical_trees_do_not_divide_by_zero() {
        let spread = tree_spread(&[1.25; 50]).unwrap();
        assert_eq!(spread, 0.0);
        let signal = inverse_spread_signal(spread);
        assert!(signal.is_finite());
        assert!((signal - (1e6f64).ln_1p()).abs() < 1e-9);
    }

    #[test]
    fn test_ml_score_bounds() {
        assert!((ml_score(0.0) - 0.70).abs() < 1e-12);
        assert!((ml_score(1.0) - 0.99).abs() < 1e-12);
        assert!((ml_score(-3.0) - 0.70).abs() < 1e-12);
        assert!((ml_score(42.0) - 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_ml_score_monotonic() {
        let mut previous = ml_score(0.0);
        for i in 1..=1000 {
            let score = ml_score(i as f64 / 1000.0);
            assert!(score >= previous);
            assert!((0.70..=0.99).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn test_ml_score_is_concave() {
        // Half the normalized confidence already buys most of the range
        let midpoint = ml_score(0.5);
        assert!(midpoint > 0.70 + 0.5 * 0.29);
    }

    #[test]
    fn test_estimate_pipeline() {
        let cal = calibrator(0.0, 10.0);
        let estimate = cal.estimate(&[1.0, 1.2, 0.8, 1.0]).unwrap();

        let expected_std = (0.02f64).sqrt();
        assert!((estimate.std_dev - expected_std).abs() < 1e-12);
        let expected_signal = (1.0 / (expected_std + SPREAD_EPSILON)).ln_1p();
        assert!((estimate.log_inv_std - expected_signal).abs() < 1e-12);
        assert!((estimate.confidence_norm - expected_signal / 10.0).abs() < 1e-12);
        assert!((0.70..=0.99).contains(&estimate.ml_score));
    }

    #[test]
    fn test_estimate_clamps_out_of_range_signal() {
        // Identical trees give ln(1 + 1e6) ~ 13.8, far above the fitted max
        let cal = calibrator(0.0, 5.0);
        let estimate = cal.estimate(&[0.5, 0.5, 0.5]).unwrap();
        assert_eq!(estimate.confidence_norm, 1.0);
        assert!((estimate.ml_score - 0.99).abs() < 1e-12);

        // Huge spread falls below the fitted min
        let cal = calibrator(1.0, 5.0);
        let estimate = cal.estimate(&[-1000.0, 1000.0]).unwrap();
        assert_eq!(estimate.confidence_norm, 0.0);
        assert!((estimate.ml_score - 0.70).abs() < 1e-12);
    }
}
