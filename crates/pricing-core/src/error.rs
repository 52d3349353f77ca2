use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Failed to read artifact {path}: {source}")]
    ArtifactIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {artifact} artifact: {reason}")]
    InvalidArtifact { artifact: String, reason: String },

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl PricingError {
    pub fn invalid(artifact: &str, reason: impl Into<String>) -> Self {
        PricingError::InvalidArtifact {
            artifact: artifact.to_string(),
            reason: reason.into(),
        }
    }
}

pub type PricingResult<T> = Result<T, PricingError>;
