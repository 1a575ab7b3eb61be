//! One training run: train, resume or skip, then evaluate and persist.
//!
//! The remote checkpoint of the run decides what happens:
//! - no checkpoint: train a fresh model,
//! - a checkpoint whose run is not finished: resume training from it,
//! - a checkpoint of a finished run: skip straight to evaluation.
//!
//! In every case the final checkpoint is saved as trained, the model is
//! evaluated, and checkpoint and metrics are uploaded under the run's keys.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use artifact_store::{ArtifactGateway, RunArtifacts};
use mnist_model::RunStatus;
use revision::RunIdentifier;
use tracing::info;

use crate::framework::{LoadedState, TrainingFramework};
use crate::metrics::MetricsDocument;

/// What a run does with the remote checkpoint it found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    TrainFromScratch,
    ResumeTraining,
    SkipTraining,
}

impl ResumeDecision {
    /// Picks the action from the status of the remote checkpoint, if any.
    #[must_use]
    pub const fn decide(remote_status: Option<RunStatus>) -> Self {
        match remote_status {
            None => Self::TrainFromScratch,
            Some(RunStatus::InProgress) => Self::ResumeTraining,
            Some(RunStatus::Trained) => Self::SkipTraining,
        }
    }
}

impl fmt::Display for ResumeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TrainFromScratch => "train_from_scratch",
            Self::ResumeTraining => "resume_training",
            Self::SkipTraining => "skip_training",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub decision: ResumeDecision,
    pub metrics: MetricsDocument,
    pub artifacts: RunArtifacts,
}

/// Runs the whole train-or-resume, evaluate, upload sequence.
///
/// Local artifacts are written to `checkpoint_dir`.
///
/// # Errors
///
/// Returns an error if `run_id` does not form a valid object key, if
/// training, evaluation, a local write, or an upload fails, or if the
/// downloaded checkpoint cannot be loaded. A failed
/// download is not an error; the run trains from scratch.
pub async fn run<F: TrainingFramework>(
    framework: &mut F,
    gateway: &ArtifactGateway,
    run_id: &RunIdentifier,
    checkpoint_dir: &Path,
) -> Result<RunReport> {
    let artifacts = RunArtifacts::new(run_id, checkpoint_dir)
        .with_context(|| format!("Run identifier '{run_id}' does not form a valid key"))?;

    info!(commit_id = %run_id, source = %run_id.source(), "Using commit ID");
    info!(base_path = artifacts.base_path(), "Remote base path");

    framework.fix_seed();
    framework.prepare_data()?;

    tokio::fs::create_dir_all(checkpoint_dir)
        .await
        .with_context(|| format!("Failed to create {}", checkpoint_dir.display()))?;

    let checkpoint_path = artifacts.checkpoint.local_path.as_path();

    let loaded = if gateway
        .fetch(&artifacts.checkpoint.remote_key, checkpoint_path)
        .await
    {
        info!(key = %artifacts.checkpoint.remote_key, "Found checkpoint in object store");
        Some(framework.load_checkpoint(checkpoint_path)?)
    } else {
        info!("No checkpoint found in object store");
        None
    };

    let decision = ResumeDecision::decide(loaded.as_ref().map(|l| l.status));

    let state = match (decision, loaded) {
        (ResumeDecision::SkipTraining, Some(LoadedState { state, .. })) => {
            info!("Model is already fully trained. Skipping to testing.");
            state
        }
        (ResumeDecision::ResumeTraining, Some(LoadedState { state, .. })) => {
            info!("Resuming training from checkpoint...");
            framework.train(state, checkpoint_path)?
        }
        _ => {
            info!("Starting training from scratch...");
            let state = framework.fresh_state()?;
            framework.train(state, checkpoint_path)?
        }
    };

    framework.save_checkpoint(&state, RunStatus::Trained, checkpoint_path)?;

    info!("Testing the model...");
    let metrics = framework.evaluate(&state)?;
    metrics.write_json(&artifacts.metrics.local_path).await?;

    for location in [&artifacts.checkpoint, &artifacts.metrics] {
        gateway
            .store(&location.local_path, &location.remote_key)
            .await?;
    }

    info!(%decision, base_path = artifacts.base_path(), "Run complete");

    Ok(RunReport {
        decision,
        metrics,
        artifacts,
    })
}
