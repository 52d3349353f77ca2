pub mod artifacts;
pub mod booster;
pub mod imputer;

use async_trait::async_trait;
use chrono::Utc;
use confidence_calibrator::ConfidenceCalibrator;
use pricing_core::{
    feature_names, FeatureImputer, FeatureRecord, ModelInfo, PriceSuggester, PricePrediction,
    PricingError, PricingResult, Regressor, ScoreScaler, FEATURE_COUNT,
};
use std::sync::Arc;

pub use artifacts::{load_artifacts, ArtifactPaths, LoadedArtifacts};
pub use booster::{GradientBoostedTrees, Link};
pub use imputer::SimpleImputer;

/// The price suggestion model running inside the server process.
///
/// All parts are immutable after construction and shared by reference, so
/// cloning is cheap and concurrent requests need no locking.
#[derive(Clone)]
pub struct PricingEngine {
    regressor: Arc<dyn Regressor>,
    imputer: Arc<dyn FeatureImputer>,
    calibrator: ConfidenceCalibrator,
    info: Arc<ModelInfo>,
}

impl PricingEngine {
    /// Assemble an engine from already-loaded parts.
    pub fn new(
        regressor: Arc<dyn Regressor>,
        imputer: Arc<dyn FeatureImputer>,
        scaler: Arc<dyn ScoreScaler>,
    ) -> Self {
        let info = ModelInfo {
            objective: regressor.objective().to_string(),
            num_trees: regressor.num_trees(),
            num_rounds: regressor.num_rounds(),
            num_features: FEATURE_COUNT,
            feature_names: feature_names().into_iter().map(String::from).collect(),
            artifacts: Vec::new(),
            loaded_at: Utc::now(),
        };
        Self {
            regressor,
            imputer,
            calibrator: ConfidenceCalibrator::new(scaler),
            info: Arc::new(info),
        }
    }

    /// Load the model, imputer and confidence scaler from disk.
    ///
    /// Fails if any artifact is missing, corrupt, or built for a different
    /// feature schema; the server must not start without all three.
    pub fn initialize(paths: &ArtifactPaths) -> PricingResult<Self> {
        tracing::info!(
            "Loading pricing artifacts (model={}, imputer={}, scaler={})",
            paths.model.display(),
            paths.imputer.display(),
            paths.scaler.display()
        );

        let loaded = load_artifacts(paths)?;
        let scaler_kind = loaded.scaler.kind();
        let mut engine = Self::new(
            Arc::new(loaded.model),
            Arc::new(loaded.imputer),
            Arc::new(loaded.scaler),
        );
        Arc::make_mut(&mut engine.info).artifacts = loaded.fingerprints;

        tracing::info!(
            "Pricing engine ready: objective={}, trees={}, rounds={}, scaler={}",
            engine.info.objective,
            engine.info.num_trees,
            engine.info.num_rounds,
            scaler_kind
        );
        Ok(engine)
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Score one record: impute, predict, and derive confidence from the
    /// spread of the individual boosting rounds.
    pub fn predict_sync(&self, record: &FeatureRecord) -> PricingResult<PricePrediction> {
        let row = self.imputer.transform(record)?;

        let price = self.regressor.predict(&row)?;
        if !price.is_finite() {
            return Err(PricingError::Inference(format!(
                "model produced non-finite price {price}"
            )));
        }

        let round_margins = (0..self.regressor.num_rounds())
            .map(|i| self.regressor.predict_margin(&row, i, i + 1))
            .collect::<PricingResult<Vec<f64>>>()?;
        let estimate = self.calibrator.estimate(&round_margins)?;

        tracing::debug!(
            "Scored record: price={:.4}, missing={}, std_dev={:.6}, confidence_norm={:.4}, ml_score={:.4}",
            price,
            record.missing_count(),
            estimate.std_dev,
            estimate.confidence_norm,
            estimate.ml_score
        );

        Ok(PricePrediction::new(price, estimate.ml_score))
    }
}

#[async_trait]
impl PriceSuggester for PricingEngine {
    async fn suggest(&self, record: FeatureRecord) -> PricingResult<PricePrediction> {
        // Linear in the number of trees; keep it off the async workers.
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.predict_sync(&record))
            .await
            .map_err(|e| PricingError::Inference(e.to_string()))?
    }

    fn backend_name(&self) -> &'static str {
        "embedded-xgboost"
    }
}
