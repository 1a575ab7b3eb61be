//! Moves local artifact files to and from the object store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectStorePath;
use object_store::{ObjectStore, ObjectStoreExt};
use tracing::{debug, info, warn};

/// Errors from uploading an artifact. All of them end the run.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to read {path}: {source}")]
    ReadLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to upload {key}: {source}")]
    Upload {
        key: ObjectStorePath,
        #[source]
        source: object_store::Error,
    },
}

/// Result of trying to download an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The object was downloaded to the local path.
    Found,
    /// The store answered that no object exists under the key.
    Absent,
    /// The object could not be obtained: permissions, credentials, network,
    /// or the local write failed.
    Unavailable(String),
}

impl FetchOutcome {
    /// Classifies a store error.
    #[must_use]
    pub fn from_store_error(error: &object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { .. } => Self::Absent,
            other => Self::Unavailable(other.to_string()),
        }
    }

    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found)
    }
}

/// Stores and fetches run artifacts in an object store namespace.
#[derive(Debug, Clone)]
pub struct ArtifactGateway {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactGateway {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Uploads `local_path` to `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload fails.
    pub async fn store(&self, local_path: &Path, key: &ObjectStorePath) -> Result<(), GatewayError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|source| GatewayError::ReadLocal {
                path: local_path.to_path_buf(),
                source,
            })?;
        let size = data.len();

        self.store
            .put(key, Bytes::from(data).into())
            .await
            .map_err(|source| GatewayError::Upload {
                key: key.clone(),
                source,
            })?;

        info!(key = %key, bytes = size, "Uploaded artifact");
        Ok(())
    }

    /// Downloads `key` into `local_path`.
    ///
    /// Returns `false` whenever the object could not be obtained, whatever the
    /// cause. Callers that only need to decide "use the remote copy or start
    /// over" do not need the distinction; [`Self::fetch_outcome`] keeps it.
    pub async fn fetch(&self, key: &ObjectStorePath, local_path: &Path) -> bool {
        self.fetch_outcome(key, local_path).await.is_found()
    }

    /// Downloads `key` into `local_path`, reporting why it did not succeed.
    pub async fn fetch_outcome(&self, key: &ObjectStorePath, local_path: &Path) -> FetchOutcome {
        let outcome = self.try_fetch(key, local_path).await;

        match &outcome {
            FetchOutcome::Found => debug!(key = %key, path = %local_path.display(), "Downloaded artifact"),
            FetchOutcome::Absent => debug!(key = %key, "Artifact not found"),
            FetchOutcome::Unavailable(reason) => {
                warn!(key = %key, reason, "Artifact unavailable, treating as not found");
            }
        }

        outcome
    }

    async fn try_fetch(&self, key: &ObjectStorePath, local_path: &Path) -> FetchOutcome {
        let data = match self.store.get(key).await {
            Ok(result) => match result.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => return FetchOutcome::from_store_error(&e),
            },
            Err(e) => return FetchOutcome::from_store_error(&e),
        };

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return FetchOutcome::Unavailable(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ));
            }
        }

        match tokio::fs::write(local_path, &data).await {
            Ok(()) => FetchOutcome::Found,
            Err(e) => {
                FetchOutcome::Unavailable(format!("cannot write {}: {e}", local_path.display()))
            }
        }
    }
}
