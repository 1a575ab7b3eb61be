//! Training and evaluation logic for the classifier.

use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::dataset::{ImageDataset, MnistBatcher, MnistData, shuffle_indices};
use crate::{MnistModel, TrainingConfig};

/// Loss and accuracy over a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationOutput {
    /// Mean cross-entropy loss per sample.
    pub loss: f32,
    /// Fraction of correctly classified samples.
    pub accuracy: f32,
    /// Number of evaluated samples.
    pub samples: usize,
}

/// Progress reported after each epoch.
#[derive(Debug, Clone, Copy)]
pub struct EpochSummary {
    /// Number of epochs completed so far, including this one.
    pub epochs_completed: usize,
    /// Mean training loss over the epoch's batches.
    pub train_loss: f32,
    /// Validation results, if a validation set is present.
    pub valid: Option<EvaluationOutput>,
}

/// Output from training.
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    /// Final training loss.
    pub final_train_loss: f32,
    /// Final validation loss (if validation data was used).
    pub final_valid_loss: Option<f32>,
    /// Final validation accuracy (if validation data was used).
    pub final_valid_accuracy: Option<f32>,
    /// Number of epochs completed, counting those done before resuming.
    pub epochs_completed: usize,
}

/// Trains the model on the provided data.
///
/// Training runs from `start_epoch` up to `config.epochs`, so a model
/// restored from a checkpoint only trains for the epochs it is missing.
/// `on_epoch` is called with the updated model after every epoch.
///
/// # Arguments
///
/// * `model` - The model to train (will be modified in place).
/// * `data` - Training and validation splits.
/// * `config` - Training configuration.
/// * `start_epoch` - Epochs already completed.
/// * `device` - Device the model lives on.
/// * `on_epoch` - Per-epoch callback, e.g. to write a checkpoint.
///
/// # Errors
///
/// Returns an error if there is no training data or the callback fails.
pub fn train<B, F>(
    model: &mut MnistModel<B>,
    data: &MnistData,
    config: &TrainingConfig,
    start_epoch: usize,
    device: &B::Device,
    mut on_epoch: F,
) -> anyhow::Result<TrainingOutput>
where
    B: AutodiffBackend,
    F: FnMut(&MnistModel<B>, &EpochSummary) -> anyhow::Result<()>,
{
    if data.train.is_empty() {
        return Err(anyhow::anyhow!("No training data provided"));
    }
    if config.batch_size == 0 {
        return Err(anyhow::anyhow!("Batch size must be positive"));
    }

    let batcher = MnistBatcher::<B>::new(device.clone());
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optimizer = AdamConfig::new().init::<B, MnistModel<B>>();

    let mut output = TrainingOutput {
        final_train_loss: 0.0,
        final_valid_loss: None,
        final_valid_accuracy: None,
        epochs_completed: start_epoch,
    };

    for epoch in start_epoch..config.epochs {
        let mut epoch_loss = 0.0;
        let mut batch_count = 0;

        let mut indices: Vec<usize> = (0..data.train.len()).collect();
        shuffle_indices(&mut indices, config.seed.wrapping_add(epoch as u64));

        for batch_indices in indices.chunks(config.batch_size) {
            let items: Vec<_> = batch_indices
                .iter()
                .filter_map(|&i| data.train.get(i))
                .collect();

            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items);

            // Forward pass
            let logits = model.forward(batch.images);
            let loss = loss_fn.forward(logits, batch.targets);

            epoch_loss += f64::from(loss.clone().into_scalar().elem::<f32>());
            batch_count += 1;

            // Backward pass
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &*model);

            // Update weights
            *model = optimizer.step(config.learning_rate, model.clone(), grads);
        }

        let train_loss = if batch_count > 0 {
            (epoch_loss / f64::from(batch_count)) as f32
        } else {
            0.0
        };

        let valid = if data.valid.is_empty() {
            None
        } else {
            Some(evaluate(
                &model.valid(),
                &data.valid,
                config.batch_size,
                device,
            ))
        };

        let summary = EpochSummary {
            epochs_completed: epoch + 1,
            train_loss,
            valid,
        };
        log_progress(&summary, config.epochs);
        on_epoch(model, &summary)?;

        output = TrainingOutput {
            final_train_loss: train_loss,
            final_valid_loss: valid.map(|v| v.loss),
            final_valid_accuracy: valid.map(|v| v.accuracy),
            epochs_completed: epoch + 1,
        };
    }

    Ok(output)
}

/// Computes the loss and accuracy of `model` on `dataset`.
///
/// Pass a model on a non-autodiff backend (see [`AutodiffModule::valid`]) so
/// dropout is disabled.
pub fn evaluate<B: Backend>(
    model: &MnistModel<B>,
    dataset: &ImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> EvaluationOutput {
    let num_samples = dataset.len();
    if num_samples == 0 || batch_size == 0 {
        return EvaluationOutput {
            loss: 0.0,
            accuracy: 0.0,
            samples: 0,
        };
    }

    let batcher = MnistBatcher::<B>::new(device.clone());
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut total_loss = 0.0f64;
    let mut correct = 0i64;
    let mut seen = 0usize;

    for batch_start in (0..num_samples).step_by(batch_size) {
        let batch_end = (batch_start + batch_size).min(num_samples);

        let items: Vec<_> = (batch_start..batch_end)
            .filter_map(|i| dataset.get(i))
            .collect();

        if items.is_empty() {
            continue;
        }

        let count = items.len();
        let batch = batcher.batch(items);
        let logits = model.forward(batch.images);

        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        total_loss += f64::from(loss.into_scalar().elem::<f32>()) * count as f64;

        let predictions = logits.argmax(1).squeeze::<1>(1);
        correct += predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        seen += count;
    }

    if seen == 0 {
        return EvaluationOutput {
            loss: 0.0,
            accuracy: 0.0,
            samples: 0,
        };
    }

    EvaluationOutput {
        loss: (total_loss / seen as f64) as f32,
        accuracy: (correct as f64 / seen as f64) as f32,
        samples: seen,
    }
}

/// Logs training progress.
fn log_progress(summary: &EpochSummary, total_epochs: usize) {
    match summary.valid {
        Some(valid) => info!(
            epoch = summary.epochs_completed,
            total_epochs,
            train_loss = summary.train_loss,
            val_loss = valid.loss,
            val_acc = valid.accuracy,
            "Epoch complete"
        ),
        None => info!(
            epoch = summary.epochs_completed,
            total_epochs,
            train_loss = summary.train_loss,
            "Epoch complete"
        ),
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataset::vision::MnistItem;

    use super::*;
    use crate::{IMAGE_SIZE, ModelConfig};

    type TestBackend = Autodiff<NdArray>;

    /// Images whose brightness encodes the label.
    fn synthetic(count: usize) -> ImageDataset {
        let items = (0..count)
            .map(|i| {
                let label = (i % 2) as u8;
                MnistItem {
                    image: [[f32::from(label) * 255.0; IMAGE_SIZE]; IMAGE_SIZE],
                    label,
                }
            })
            .collect();
        ImageDataset::from_items(items)
    }

    fn data() -> MnistData {
        MnistData {
            train: synthetic(32),
            valid: synthetic(8),
            test: synthetic(8),
        }
    }

    fn config(epochs: usize) -> TrainingConfig {
        TrainingConfig::new(ModelConfig::new().with_hidden_size(16))
            .with_epochs(epochs)
            .with_batch_size(16)
    }

    #[test]
    fn test_training() {
        let device = NdArrayDevice::default();
        let config = config(2);
        let mut model: MnistModel<TestBackend> = config.model.init(&device);

        let mut seen_epochs = Vec::new();
        let output = train(&mut model, &data(), &config, 0, &device, |_, summary| {
            seen_epochs.push(summary.epochs_completed);
            Ok(())
        })
        .expect("Training should succeed");

        assert_eq!(output.epochs_completed, 2);
        assert_eq!(seen_epochs, vec![1, 2]);
        assert!(output.final_valid_loss.is_some());
        assert!(output.final_train_loss.is_finite());
    }

    #[test]
    fn test_resume_trains_remaining_epochs() {
        let device = NdArrayDevice::default();
        let config = config(3);
        let mut model: MnistModel<TestBackend> = config.model.init(&device);

        let mut calls = 0;
        let output = train(&mut model, &data(), &config, 2, &device, |_, _| {
            calls += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(output.epochs_completed, 3);
    }

    #[test]
    fn test_nothing_left_to_train() {
        let device = NdArrayDevice::default();
        let config = config(2);
        let mut model: MnistModel<TestBackend> = config.model.init(&device);

        let output = train(&mut model, &data(), &config, 2, &device, |_, _| {
            panic!("no epoch should run")
        })
        .unwrap();

        assert_eq!(output.epochs_completed, 2);
    }

    #[test]
    fn test_empty_training_set() {
        let device = NdArrayDevice::default();
        let config = config(1);
        let mut model: MnistModel<TestBackend> = config.model.init(&device);
        let data = MnistData {
            train: ImageDataset::from_items(vec![]),
            valid: synthetic(2),
            test: synthetic(2),
        };

        assert!(train(&mut model, &data, &config, 0, &device, |_, _| Ok(())).is_err());
    }

    #[test]
    fn test_callback_error_stops_training() {
        let device = NdArrayDevice::default();
        let config = config(3);
        let mut model: MnistModel<TestBackend> = config.model.init(&device);

        let result = train(&mut model, &data(), &config, 0, &device, |_, _| {
            Err(anyhow::anyhow!("disk full"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_evaluate() {
        let device = NdArrayDevice::default();
        let model: MnistModel<NdArray> = ModelConfig::new().with_hidden_size(16).init(&device);

        let output = evaluate(&model, &synthetic(10), 4, &device);
        assert_eq!(output.samples, 10);
        assert!((0.0..=1.0).contains(&output.accuracy));
        assert!(output.loss > 0.0);
    }

    #[test]
    fn test_evaluate_empty() {
        let device = NdArrayDevice::default();
        let model: MnistModel<NdArray> = ModelConfig::new().init(&device);

        let output = evaluate(&model, &ImageDataset::from_items(vec![]), 4, &device);
        assert_eq!(output.samples, 0);
    }
}
