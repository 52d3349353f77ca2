use confidence_calibrator::ConfidenceScaler;
use pricing_core::{
    feature_names, ArtifactFingerprint, ArtifactRole, PricingError, PricingResult, FEATURE_COUNT,
};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::booster::GradientBoostedTrees;
use crate::imputer::SimpleImputer;

pub const DEFAULT_MODEL_FILE: &str = "suggested_price_xgb_model.json";
pub const DEFAULT_IMPUTER_FILE: &str = "imputer.json";
pub const DEFAULT_SCALER_FILE: &str = "confidence_scaler.json";

/// Locations of the three pre-fitted artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub imputer: PathBuf,
    pub scaler: PathBuf,
}

impl ArtifactPaths {
    pub fn new(
        dir: impl AsRef<Path>,
        model_file: &str,
        imputer_file: &str,
        scaler_file: &str,
    ) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(model_file),
            imputer: dir.join(imputer_file),
            scaler: dir.join(scaler_file),
        }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir, DEFAULT_MODEL_FILE, DEFAULT_IMPUTER_FILE, DEFAULT_SCALER_FILE)
    }
}

/// Artifacts parsed from disk, with their fingerprints.
pub struct LoadedArtifacts {
    pub model: GradientBoostedTrees,
    pub imputer: SimpleImputer,
    pub scaler: ConfidenceScaler,
    pub fingerprints: Vec<ArtifactFingerprint>,
}

/// Read a file and fingerprint its contents.
fn read_artifact(role: ArtifactRole, path: &Path) -> PricingResult<(Vec<u8>, ArtifactFingerprint)> {
    let bytes = std::fs::read(path).map_err(|source| PricingError::ArtifactIo {
        path: path.display().to_string(),
        source,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let fingerprint = ArtifactFingerprint {
        role,
        path: path.display().to_string(),
        sha256: hex::encode(hasher.finalize()),
        size_bytes: bytes.len() as u64,
    };
    tracing::debug!(
        "Read {:?} artifact {} ({} bytes, sha256={})",
        role,
        fingerprint.path,
        fingerprint.size_bytes,
        fingerprint.sha256
    );

    Ok((bytes, fingerprint))
}

/// The model must consume exactly the pricing features, in order.
fn check_model_schema(model: &GradientBoostedTrees) -> PricingResult<()> {
    if model.num_features() != FEATURE_COUNT {
        return Err(PricingError::SchemaMismatch(format!(
            "model expects {} features, pricing schema has {FEATURE_COUNT}",
            model.num_features()
        )));
    }
    if !model.feature_names().is_empty() && model.feature_names() != feature_names().as_slice() {
        return Err(PricingError::SchemaMismatch(format!(
            "model columns {:?} differ from the pricing features",
            model.feature_names()
        )));
    }
    Ok(())
}

/// Load and validate all three artifacts. Any failure is fatal for startup.
pub fn load_artifacts(paths: &ArtifactPaths) -> PricingResult<LoadedArtifacts> {
    let (model_bytes, model_fp) = read_artifact(ArtifactRole::Model, &paths.model)?;
    let (imputer_bytes, imputer_fp) = read_artifact(ArtifactRole::Imputer, &paths.imputer)?;
    let (scaler_bytes, scaler_fp) = read_artifact(ArtifactRole::Scaler, &paths.scaler)?;

    let model = GradientBoostedTrees::from_json(&model_bytes)?;
    check_model_schema(&model)?;
    let imputer = SimpleImputer::from_json(&imputer_bytes)?;
    let scaler = ConfidenceScaler::from_json(&scaler_bytes)?;

    Ok(LoadedArtifacts {
        model,
        imputer,
        scaler,
        fingerprints: vec![model_fp, imputer_fp, scaler_fp],
    })
}
