pub mod error;
pub mod pricing;
pub mod provider;

pub use error::{MLError, MLResult};
pub use pricing::PricingClient;
pub use provider::HttpPriceSuggester;

use std::time::Duration;

pub const DEFAULT_PRICING_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the pricing service client
#[derive(Debug, Clone, PartialEq)]
pub struct MLConfig {
    pub pricing_url: String,
    pub timeout: Duration,
}

impl Default for MLConfig {
    fn default() -> Self {
        Self {
            pricing_url: DEFAULT_PRICING_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl MLConfig {
    /// Read `ML_PRICING_URL` and `ML_PRICING_TIMEOUT_SECS`.
    pub fn from_env() -> MLResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MLResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("ML_PRICING_URL") {
            let url = url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(MLError::Config(format!(
                    "ML_PRICING_URL must be an http(s) URL, got '{url}'"
                )));
            }
            config.pricing_url = url.to_string();
        }

        if let Some(raw) = lookup("ML_PRICING_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                MLError::Config(format!(
                    "ML_PRICING_TIMEOUT_SECS must be a positive number of seconds, got '{raw}'"
                ))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

impl PricingClient {
    pub fn from_config(config: &MLConfig) -> MLResult<Self> {
        Self::new(config.pricing_url.clone(), config.timeout)
    }

    /// Client configured from the environment.
    pub fn from_env() -> MLResult<Self> {
        Self::from_config(&MLConfig::from_env()?)
    }
}
