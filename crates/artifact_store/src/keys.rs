//! Local paths and remote keys of the artifacts a run persists.

use std::path::{Path, PathBuf};

use object_store::path::{Error as PathError, Path as ObjectStorePath};
use revision::RunIdentifier;

/// Prefix under which every run stores its artifacts.
pub const RESULTS_PREFIX: &str = "model_results";

/// File name of the model checkpoint, locally and remotely.
pub const CHECKPOINT_FILE: &str = "mnist_model.ckpt";

/// File name of the metrics document, locally and remotely.
pub const METRICS_FILE: &str = "metrics.json";

/// Where an artifact lives locally and under which key it is stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub local_path: PathBuf,
    pub remote_key: ObjectStorePath,
}

/// Artifact locations of one run.
///
/// Keys only depend on the run identifier, so re-running an unchanged
/// revision addresses the same remote objects.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    base_path: String,
    pub checkpoint: ArtifactLocation,
    pub metrics: ArtifactLocation,
}

impl RunArtifacts {
    /// Builds the locations for `run_id`, with local files in `checkpoint_dir`.
    ///
    /// The run id is inserted into the keys as is, without percent-encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the run id does not form a valid key, e.g. it
    /// contains `..`, an empty segment, or a control character.
    pub fn new(run_id: &RunIdentifier, checkpoint_dir: &Path) -> Result<Self, PathError> {
        let base_path = format!("{RESULTS_PREFIX}/{run_id}");

        let checkpoint = ArtifactLocation {
            local_path: checkpoint_dir.join(CHECKPOINT_FILE),
            remote_key: ObjectStorePath::parse(format!("{base_path}/{CHECKPOINT_FILE}"))?,
        };
        let metrics = ArtifactLocation {
            local_path: checkpoint_dir.join(METRICS_FILE),
            remote_key: ObjectStorePath::parse(format!("{base_path}/{METRICS_FILE}"))?,
        };

        Ok(Self {
            base_path,
            checkpoint,
            metrics,
        })
    }

    /// Remote prefix shared by all artifacts of the run.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
