//! Remote persistence of run artifacts.
//!
//! Artifacts of a run live under `model_results/<run id>/` in the bucket.
//! Uploads overwrite, downloads report "not found" for any failure.

mod gateway;
mod keys;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use gateway::{ArtifactGateway, FetchOutcome, GatewayError};
pub use keys::{ArtifactLocation, CHECKPOINT_FILE, METRICS_FILE, RESULTS_PREFIX, RunArtifacts};
