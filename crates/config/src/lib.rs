//! Run configuration loaded from environment variables.

use std::sync::Arc;

use anyhow::{Context, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use tracing::debug;

/// Region used when `AWS_REGION` is not set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Bucket holding the run artifacts.
    pub bucket_name: String,

    /// Region of the bucket.
    pub region: String,

    /// Access key id, if provided explicitly.
    pub access_key_id: Option<String>,

    /// Secret access key, if provided explicitly.
    pub secret_access_key: Option<String>,

    /// Custom S3-compatible endpoint (e.g. a local `MinIO`).
    pub endpoint: Option<String>,

    /// Explicit revision used instead of the git HEAD.
    pub commit_id: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "***"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("endpoint", &self.endpoint)
            .field("commit_id", &self.commit_id)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `S3_BUCKET_NAME`: bucket receiving checkpoints and metrics
    ///
    /// Optional environment variables:
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`: credentials
    /// - `AWS_REGION`: bucket region (default: `us-east-1`)
    /// - `AWS_ENDPOINT_URL`: custom S3-compatible endpoint
    /// - `COMMIT_ID`: revision override (set by CI)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. Blank values count as empty,
    /// except for `COMMIT_ID`, which is passed on verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if `S3_BUCKET_NAME` is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let commit_id = lookup("COMMIT_ID").filter(|value| !value.is_empty());

        let bucket_name =
            get("S3_BUCKET_NAME").context("S3_BUCKET_NAME environment variable not set")?;

        Ok(Self {
            bucket_name,
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: get("AWS_ACCESS_KEY_ID"),
            secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            endpoint: get("AWS_ENDPOINT_URL"),
            commit_id,
        })
    }
}

/// Creates the S3 object store described by `config`.
///
/// Credentials that are not set explicitly are left to the builder, so the
/// store only fails once a request is made.
///
/// # Errors
///
/// Returns an error if the store cannot be configured.
pub fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket_name)
        .with_region(&config.region);

    if let Some(key) = &config.access_key_id {
        builder = builder.with_access_key_id(key);
    }
    if let Some(secret) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    if let Some(endpoint) = &config.endpoint {
        debug!(endpoint, "Using custom object store endpoint");
        builder = builder.with_endpoint(endpoint).with_allow_http(true);
    }

    let store = builder
        .build()
        .with_context(|| format!("Failed to configure bucket {}", config.bucket_name))?;

    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_bucket_is_an_error() {
        let result = Config::from_lookup(lookup(&[("AWS_REGION", "eu-west-1")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("S3_BUCKET_NAME", "runs")])).unwrap();
        assert_eq!(config.bucket_name, "runs");
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.access_key_id.is_none());
        assert!(config.commit_id.is_none());
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config::from_lookup(lookup(&[
            ("S3_BUCKET_NAME", "runs"),
            ("COMMIT_ID", ""),
            ("AWS_REGION", " "),
        ]))
        .unwrap();
        assert!(config.commit_id.is_none());
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_blank_commit_id_is_kept() {
        let config =
            Config::from_lookup(lookup(&[("S3_BUCKET_NAME", "runs"), ("COMMIT_ID", " ")])).unwrap();
        assert_eq!(config.commit_id.as_deref(), Some(" "));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = Config::from_lookup(lookup(&[
            ("S3_BUCKET_NAME", "runs"),
            ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "hunter2"),
        ]))
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("AKIAEXAMPLE"));
    }

    #[test]
    fn test_build_object_store() {
        let config = Config::from_lookup(lookup(&[
            ("S3_BUCKET_NAME", "runs"),
            ("AWS_ACCESS_KEY_ID", "key"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_ENDPOINT_URL", "http://localhost:9000"),
        ]))
        .unwrap();
        assert!(build_object_store(&config).is_ok());
    }
}
