//! Confidence Calibrator Module
//!
//! Turns the disagreement between individual trees of the price model into
//! a bounded confidence score. The spread is inverted, log-compressed,
//! normalized by a scaler fitted offline, and reshaped onto [0.70, 0.99].

pub mod scaler;
pub mod uncertainty;

pub use scaler::{ConfidenceScaler, MinMaxScaler, StandardScaler};
pub use uncertainty::{
    inverse_spread_signal, ml_score, tree_spread, ConfidenceCalibrator, ConfidenceEstimate,
    ML_SCORE_CEILING, ML_SCORE_EXPONENT, ML_SCORE_FLOOR, SPREAD_EPSILON,
};
