use pricing_core::{FeatureRecord, PricePrediction, ServiceHealth};
use std::time::Duration;

use crate::error::{MLError, MLResult};

/// Client for the price suggestion service.
#[derive(Clone)]
pub struct PricingClient {
    client: reqwest::Client,
    base_url: String,
}

impl PricingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> MLResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Suggest a price for one product. Features left unset are imputed
    /// by the service.
    pub async fn predict(&self, features: &FeatureRecord) -> MLResult<PricePrediction> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(features)
            .send()
            .await
            .map_err(MLError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(MLError::ModelNotLoaded);
            }
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Pricing service returned {}: {}", status, body);
            return Err(MLError::ServiceUnavailable(format!("Status: {}", status)));
        }

        let bytes = response.bytes().await.map_err(MLError::from_transport)?;
        let prediction: PricePrediction = serde_json::from_slice(&bytes)?;
        if !prediction.suggested_price.is_finite() || !prediction.ml_score.is_finite() {
            return Err(MLError::InvalidResponse(format!(
                "non-finite prediction {prediction:?}"
            )));
        }
        Ok(prediction)
    }

    /// Check service health and fetch the loaded model description.
    pub async fn health(&self) -> MLResult<ServiceHealth> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(MLError::from_transport)?;

        if !response.status().is_success() {
            return Err(MLError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(MLError::from_transport)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
