//! The deep-learning framework seen by the run driver.

use std::path::Path;

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use mnist_model::{MnistData, MnistModel, RunStatus, TrainingConfig};
use tracing::info;

use crate::metrics::MetricsDocument;

/// A model state restored from a checkpoint file.
#[derive(Debug)]
pub struct LoadedState<S> {
    pub state: S,
    pub status: RunStatus,
}

/// Operations the driver delegates to the training framework.
pub trait TrainingFramework {
    /// Model state carried between the steps of a run.
    type State;

    /// Fixes the random seed used for initialization and shuffling.
    fn fix_seed(&mut self);

    /// Builds the data pipeline.
    fn prepare_data(&mut self) -> Result<()> {
        Ok(())
    }

    /// Creates an untrained model state.
    fn fresh_state(&mut self) -> Result<Self::State>;

    /// Restores a state written by [`Self::save_checkpoint`].
    fn load_checkpoint(&mut self, path: &Path) -> Result<LoadedState<Self::State>>;

    /// Trains `state` to completion. Intermediate checkpoints go to `checkpoint_path`.
    fn train(&mut self, state: Self::State, checkpoint_path: &Path) -> Result<Self::State>;

    /// Writes `state` with `status` to `path`.
    fn save_checkpoint(&mut self, state: &Self::State, status: RunStatus, path: &Path)
    -> Result<()>;

    /// Evaluates `state` on the test set.
    fn evaluate(&mut self, state: &Self::State) -> Result<MetricsDocument>;
}

/// Model weights and how far training got.
#[derive(Debug)]
pub struct ModelState<B: Backend> {
    pub model: MnistModel<B>,
    pub epochs_completed: usize,
}

/// [`TrainingFramework`] backed by Burn and the MNIST classifier.
pub struct BurnFramework<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
    data: Option<MnistData>,
}

impl<B: AutodiffBackend> BurnFramework<B> {
    /// Creates a framework that downloads MNIST in [`TrainingFramework::prepare_data`].
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            data: None,
        }
    }

    /// Creates a framework that uses already loaded data.
    pub fn with_data(config: TrainingConfig, device: B::Device, data: MnistData) -> Self {
        Self {
            config,
            device,
            data: Some(data),
        }
    }

    fn data(&self) -> Result<&MnistData> {
        self.data.as_ref().context("MNIST data has not been prepared")
    }
}

impl<B: AutodiffBackend> TrainingFramework for BurnFramework<B> {
    type State = ModelState<B>;

    fn fix_seed(&mut self) {
        info!(seed = self.config.seed, "Seed set");
        B::seed(self.config.seed);
    }

    fn prepare_data(&mut self) -> Result<()> {
        if self.data.is_none() {
            self.data = Some(MnistData::load(
                self.config.validation_size,
                self.config.seed,
            ));
        }
        Ok(())
    }

    fn fresh_state(&mut self) -> Result<Self::State> {
        Ok(ModelState {
            model: self.config.model.init(&self.device),
            epochs_completed: 0,
        })
    }

    fn load_checkpoint(&mut self, path: &Path) -> Result<LoadedState<Self::State>> {
        let checkpoint = mnist_model::load_checkpoint::<B>(path, &self.config.model, &self.device)?;

        Ok(LoadedState {
            state: ModelState {
                model: checkpoint.model,
                epochs_completed: checkpoint.epochs_completed,
            },
            status: checkpoint.status,
        })
    }

    fn train(&mut self, state: Self::State, checkpoint_path: &Path) -> Result<Self::State> {
        let ModelState {
            mut model,
            epochs_completed,
        } = state;

        let data = self.data()?;
        let output = mnist_model::train(
            &mut model,
            data,
            &self.config,
            epochs_completed,
            &self.device,
            |model, summary| {
                mnist_model::save_checkpoint(
                    model,
                    RunStatus::InProgress,
                    summary.epochs_completed,
                    checkpoint_path,
                )
            },
        )?;

        info!(
            final_train_loss = output.final_train_loss,
            final_valid_loss = output.final_valid_loss,
            final_valid_accuracy = output.final_valid_accuracy,
            epochs_completed = output.epochs_completed,
            "Training completed"
        );

        Ok(ModelState {
            model,
            epochs_completed: output.epochs_completed,
        })
    }

    fn save_checkpoint(
        &mut self,
        state: &Self::State,
        status: RunStatus,
        path: &Path,
    ) -> Result<()> {
        mnist_model::save_checkpoint(&state.model, status, state.epochs_completed, path)
    }

    fn evaluate(&mut self, state: &Self::State) -> Result<MetricsDocument> {
        let data = self.data()?;
        let output = mnist_model::evaluate(
            &state.model.valid(),
            &data.test,
            self.config.batch_size,
            &self.device,
        );

        info!(
            samples = output.samples,
            test_loss = output.loss,
            test_acc = output.accuracy,
            "Evaluation completed"
        );

        Ok(MetricsDocument::new()
            .with("test_loss", f64::from(output.loss))
            .with("test_acc", f64::from(output.accuracy)))
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataset::vision::MnistItem;
    use mnist_model::{IMAGE_SIZE, ImageDataset, ModelConfig};

    use super::*;

    type TestBackend = Autodiff<NdArray>;

    fn synthetic(count: usize) -> ImageDataset {
        let items = (0..count)
            .map(|i| MnistItem {
                image: [[(i % 2) as f32 * 255.0; IMAGE_SIZE]; IMAGE_SIZE],
                label: (i % 2) as u8,
            })
            .collect();
        ImageDataset::from_items(items)
    }

    fn framework(epochs: usize) -> BurnFramework<TestBackend> {
        let config = TrainingConfig::new(ModelConfig::new().with_hidden_size(16))
            .with_epochs(epochs)
            .with_batch_size(8);
        let data = MnistData {
            train: synthetic(16),
            valid: synthetic(4),
            test: synthetic(6),
        };
        BurnFramework::with_data(config, NdArrayDevice::default(), data)
    }

    #[test]
    fn test_train_writes_in_progress_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnist_model.ckpt");
        let mut framework = framework(2);

        let state = framework.fresh_state().unwrap();
        let state = framework.train(state, &path).unwrap();
        assert_eq!(state.epochs_completed, 2);

        let loaded = framework.load_checkpoint(&path).unwrap();
        assert_eq!(loaded.status, RunStatus::InProgress);
        assert_eq!(loaded.state.epochs_completed, 2);
    }

    #[test]
    fn test_save_trained_and_evaluate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnist_model.ckpt");
        let mut framework = framework(1);

        let state = framework.fresh_state().unwrap();
        framework
            .save_checkpoint(&state, RunStatus::Trained, &path)
            .unwrap();
        let loaded = framework.load_checkpoint(&path).unwrap();
        assert!(loaded.status.is_trained());

        let metrics = framework.evaluate(&loaded.state).unwrap();
        let accuracy = metrics.get("test_acc").unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(metrics.get("test_loss").is_some());
    }

    #[test]
    fn test_unprepared_data_is_an_error() {
        let config = TrainingConfig::new(ModelConfig::new().with_hidden_size(16));
        let mut framework =
            BurnFramework::<TestBackend>::new(config, NdArrayDevice::default());

        let state = framework.fresh_state().unwrap();
        assert!(framework.evaluate(&state).is_err());
    }
}
