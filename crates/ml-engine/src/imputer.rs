use pricing_core::{
    feature_names, FeatureImputer, FeatureRecord, FeatureRow, PricingError, PricingResult,
    FEATURE_COUNT,
};
use serde::{Deserialize, Serialize};

const ARTIFACT: &str = "imputer";

/// Column-wise fill values exported from a fitted simple imputer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleImputer {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    pub statistics: Vec<f64>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

fn default_strategy() -> String {
    "median".to_string()
}

impl SimpleImputer {
    pub fn new(statistics: [f64; FEATURE_COUNT]) -> Self {
        Self {
            strategy: default_strategy(),
            statistics: statistics.to_vec(),
            feature_names: Vec::new(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> PricingResult<Self> {
        let imputer: SimpleImputer = serde_json::from_slice(bytes)
            .map_err(|e| PricingError::invalid(ARTIFACT, e.to_string()))?;
        imputer.validate()?;
        Ok(imputer)
    }

    pub fn validate(&self) -> PricingResult<()> {
        if self.statistics.len() != FEATURE_COUNT {
            return Err(PricingError::invalid(
                ARTIFACT,
                format!(
                    "expected {FEATURE_COUNT} statistics, got {}",
                    self.statistics.len()
                ),
            ));
        }
        if let Some(i) = self.statistics.iter().position(|v| !v.is_finite()) {
            return Err(PricingError::invalid(
                ARTIFACT,
                format!("statistic {i} is not finite"),
            ));
        }
        if !self.feature_names.is_empty() && self.feature_names != feature_names() {
            return Err(PricingError::SchemaMismatch(format!(
                "imputer columns {:?} differ from the pricing features",
                self.feature_names
            )));
        }
        Ok(())
    }
}

impl FeatureImputer for SimpleImputer {
    fn transform(&self, record: &FeatureRecord) -> PricingResult<FeatureRow> {
        let mut row = [0.0; FEATURE_COUNT];
        for (i, (value, fill)) in record.values().iter().zip(&self.statistics).enumerate() {
            row[i] = value.unwrap_or(*fill);
        }
        Ok(FeatureRow(row))
    }
}
