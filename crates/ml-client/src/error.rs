use pricing_core::PricingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MLError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MLError {
    /// Separate timeouts from other transport failures.
    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MLError::Timeout
        } else {
            MLError::RequestFailed(e)
        }
    }
}

impl From<MLError> for PricingError {
    fn from(e: MLError) -> Self {
        match e {
            MLError::ModelNotLoaded | MLError::ServiceUnavailable(_) | MLError::Timeout => {
                PricingError::Unavailable(e.to_string())
            }
            other => PricingError::Inference(other.to_string()),
        }
    }
}

pub type MLResult<T> = Result<T, MLError>;
