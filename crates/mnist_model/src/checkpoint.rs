//! Model checkpoints with run metadata.
//!
//! A checkpoint is a single file holding a Burn record: the model weights,
//! the [`RunStatus`] of the run that wrote it, and how many epochs were
//! completed. The run status is kept next to the weights rather than inside
//! the model so that "is this run finished" never depends on model fields.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Record, Recorder};
use tracing::debug;

use crate::{MnistModel, MnistModelRecord, ModelConfig};

/// Completion state of the run a checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Training has not finished; the checkpoint can be resumed.
    InProgress,
    /// Training finished; the checkpoint is ready for evaluation.
    Trained,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Trained => "trained",
        }
    }

    /// Parses a stored status. Anything but `trained` reads as in progress.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        if value == Self::Trained.as_str() {
            Self::Trained
        } else {
            Self::InProgress
        }
    }

    #[must_use]
    pub const fn is_trained(self) -> bool {
        matches!(self, Self::Trained)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk layout of a checkpoint.
#[derive(Record)]
struct CheckpointRecord<B: Backend> {
    model: MnistModelRecord<B>,
    status: String,
    epochs_completed: usize,
}

/// A model restored from a checkpoint.
#[derive(Debug)]
pub struct Checkpoint<B: Backend> {
    pub model: MnistModel<B>,
    pub status: RunStatus,
    pub epochs_completed: usize,
}

type CheckpointRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Saves the model checkpoint to disk.
///
/// # Arguments
///
/// * `model` - The model to save.
/// * `status` - Completion state of the run.
/// * `epochs_completed` - Number of epochs the model was trained for.
/// * `path` - The file to write, parent directories are created.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_checkpoint<B: Backend>(
    model: &MnistModel<B>,
    status: RunStatus,
    epochs_completed: usize,
    path: &Path,
) -> Result<()> {
    let record = CheckpointRecord {
        model: model.clone().into_record(),
        status: status.as_str().to_string(),
        epochs_completed,
    };

    let bytes = Recorder::<B>::record(&CheckpointRecorder::default(), record, ())
        .map_err(|e| anyhow::anyhow!("Failed to serialize checkpoint: {e:?}"))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write checkpoint {}", path.display()))?;

    debug!(path = %path.display(), %status, epochs_completed, "Saved checkpoint");
    Ok(())
}

/// Loads a model checkpoint from disk.
///
/// # Arguments
///
/// * `path` - The file to load.
/// * `config` - Architecture the checkpoint was trained with.
/// * `device` - The device to load the model to.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid checkpoint.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    config: &ModelConfig,
    device: &B::Device,
) -> Result<Checkpoint<B>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;

    let record: CheckpointRecord<B> =
        Recorder::<B>::load(&CheckpointRecorder::default(), bytes, device)
            .map_err(|e| anyhow::anyhow!("Invalid checkpoint {}: {e:?}", path.display()))?;

    let model = config.init::<B>(device).load_record(record.model);

    Ok(Checkpoint {
        model,
        status: RunStatus::from_stored(&record.status),
        epochs_completed: record.epochs_completed,
    })
}
