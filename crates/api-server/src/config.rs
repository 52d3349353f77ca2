use anyhow::{Context, Result};
use ml_engine::artifacts::{DEFAULT_IMPUTER_FILE, DEFAULT_MODEL_FILE, DEFAULT_SCALER_FILE};
use ml_engine::ArtifactPaths;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Server settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub model_dir: PathBuf,
    pub artifacts: ArtifactPaths,
    /// `None` allows any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
    pub enable_hsts: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let host: IpAddr = host
            .parse()
            .with_context(|| format!("HOST must be an IP address, got '{host}'"))?;

        let port = var("PORT", "5000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("PORT must be a port number, got '{port}'"))?;

        let model_dir = PathBuf::from(var("MODEL_DIR", "./models"));
        let artifacts = ArtifactPaths::new(
            &model_dir,
            &var("MODEL_FILE", DEFAULT_MODEL_FILE),
            &var("IMPUTER_FILE", DEFAULT_IMPUTER_FILE),
            &var("SCALER_FILE", DEFAULT_SCALER_FILE),
        );

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        let enable_hsts = match lookup("ENABLE_HSTS") {
            None => false,
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("ENABLE_HSTS must be true or false, got '{raw}'"))?,
        };

        Ok(Self {
            host,
            port,
            model_dir,
            artifacts,
            cors_allowed_origins,
            enable_hsts,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => anyhow::bail!("unrecognized flag '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.artifacts, ArtifactPaths::in_dir("./models"));
        assert!(config.cors_allowed_origins.is_none());
        assert!(!config.enable_hsts);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("MODEL_DIR", "/srv/pricing"),
            ("MODEL_FILE", "xgb.json"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:5173, https://shop.example.com,"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.artifacts.model, PathBuf::from("/srv/pricing/xgb.json"));
        assert_eq!(
            config.artifacts.imputer,
            PathBuf::from("/srv/pricing").join(DEFAULT_IMPUTER_FILE)
        );
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec![
                "http://localhost:5173".to_string(),
                "https://shop.example.com".to_string()
            ])
        );
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config(&[("PORT", "http")]).is_err());
        assert!(config(&[("PORT", "70000")]).is_err());
        assert!(config(&[("HOST", "localhost")]).is_err());
        assert!(config(&[("ENABLE_HSTS", "maybe")]).is_err());
    }

    #[test]
    fn test_hsts_flag() {
        for on in ["true", "TRUE", "1", "yes"] {
            assert!(config(&[("ENABLE_HSTS", on)]).unwrap().enable_hsts, "{on}");
        }
        for off in ["false", "0", "no"] {
            assert!(!config(&[("ENABLE_HSTS", off)]).unwrap().enable_hsts, "{off}");
        }
    }
}
