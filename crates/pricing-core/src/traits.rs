use async_trait::async_trait;

use crate::{FeatureRecord, FeatureRow, PricePrediction, PricingResult};

/// A trained tree ensemble.
pub trait Regressor: Send + Sync {
    /// Whole-ensemble prediction in output space.
    fn predict(&self, row: &FeatureRow) -> PricingResult<f64>;

    /// Raw margin of the boosting rounds in `[begin, end)`, base margin included.
    fn predict_margin(&self, row: &FeatureRow, begin: usize, end: usize) -> PricingResult<f64>;

    /// Number of boosting rounds.
    fn num_rounds(&self) -> usize;

    fn num_trees(&self) -> usize {
        self.num_rounds()
    }

    fn objective(&self) -> &str {
        "unknown"
    }
}

/// Fills missing values with statistics learned at training time.
pub trait FeatureImputer: Send + Sync {
    fn transform(&self, record: &FeatureRecord) -> PricingResult<FeatureRow>;
}

/// Normalizes the single-column uncertainty signal.
pub trait ScoreScaler: Send + Sync {
    fn transform(&self, value: f64) -> PricingResult<f64>;
}

/// Backend-agnostic price suggestion.
///
/// Implemented by the in-process engine and by the HTTP client.
#[async_trait]
pub trait PriceSuggester: Send + Sync {
    async fn suggest(&self, record: FeatureRecord) -> PricingResult<PricePrediction>;

    fn backend_name(&self) -> &'static str;
}
