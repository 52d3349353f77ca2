use async_trait::async_trait;
use pricing_core::{FeatureRecord, PricePrediction, PriceSuggester, PricingResult};

use crate::PricingClient;

/// HTTP-backed suggester that delegates to a remote pricing service.
pub struct HttpPriceSuggester {
    client: PricingClient,
}

impl HttpPriceSuggester {
    pub fn new(client: PricingClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PriceSuggester for HttpPriceSuggester {
    async fn suggest(&self, record: FeatureRecord) -> PricingResult<PricePrediction> {
        Ok(self.client.predict(&record).await?)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
