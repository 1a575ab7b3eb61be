//! MNIST digit classifier.
//!
//! This crate uses the Burn deep learning framework to define, train,
//! evaluate and checkpoint a small convolutional network that classifies
//! 28x28 grayscale digits.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;

mod checkpoint;
mod dataset;
mod training;

pub use checkpoint::{Checkpoint, RunStatus, load_checkpoint, save_checkpoint};
pub use dataset::{
    IMAGE_SIZE, ImageDataset, MnistBatch, MnistBatcher, MnistData, NUM_CLASSES, shuffle_indices,
};
pub use training::{EpochSummary, EvaluationOutput, TrainingOutput, evaluate, train};

/// Spatial size after the adaptive pooling layer.
const POOLED_SIZE: usize = 8;

/// Configuration for the classifier.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Number of output classes.
    #[config(default = 10)]
    pub num_classes: usize,
    /// Number of hidden units in the fully connected layer.
    #[config(default = 512)]
    pub hidden_size: usize,
    /// Dropout rate for regularization.
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ModelConfig {
    /// Creates a new model on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MnistModel<B> {
        MnistModel {
            conv1: Conv2dConfig::new([1, 8], [3, 3]).init(device),
            conv2: Conv2dConfig::new([8, 16], [3, 3]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([POOLED_SIZE, POOLED_SIZE]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            linear1: LinearConfig::new(16 * POOLED_SIZE * POOLED_SIZE, self.hidden_size)
                .init(device),
            linear2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

/// Configuration for a training run.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Model architecture configuration.
    pub model: ModelConfig,
    /// Total number of training epochs.
    #[config(default = 5)]
    pub epochs: usize,
    /// Batch size for training and evaluation.
    #[config(default = 64)]
    pub batch_size: usize,
    /// Learning rate for the Adam optimizer.
    #[config(default = 1.0e-3)]
    pub learning_rate: f64,
    /// Seed for weight initialization and shuffling.
    #[config(default = 42)]
    pub seed: u64,
    /// Number of training images held out for validation.
    #[config(default = 5000)]
    pub validation_size: usize,
}

/// The digit classifier.
///
/// Two convolutions followed by adaptive pooling and a two layer
/// feedforward head producing one logit per class.
#[derive(Module, Debug)]
pub struct MnistModel<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    linear1: Linear<B>,
    linear2: Linear<B>,
    activation: Relu,
}

impl<B: Backend> MnistModel<B> {
    /// Forward pass through the network.
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape [`batch_size`, height, width]
    ///
    /// # Returns
    ///
    /// Tensor of shape [`batch_size`, `num_classes`] containing logits.
    pub fn forward(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, height, width] = images.dims();

        let x = images.reshape([batch_size, 1, height, width]);
        let x = self.conv1.forward(x);
        let x = self.dropout.forward(x);
        let x = self.conv2.forward(x);
        let x = self.dropout.forward(x);
        let x = self.activation.forward(x);

        let x = self.pool.forward(x);
        let x = x.reshape([batch_size, 16 * POOLED_SIZE * POOLED_SIZE]);
        let x = self.linear1.forward(x);
        let x = self.dropout.forward(x);
        let x = self.activation.forward(x);

        self.linear2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: MnistModel<TestBackend> = ModelConfig::new().init(&device);

        let images = Tensor::<TestBackend, 3>::zeros([4, IMAGE_SIZE, IMAGE_SIZE], &device);
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [4, NUM_CLASSES]);
    }

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::new(ModelConfig::new());
        assert_eq!(config.epochs, 5);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.seed, 42);
        assert!(config.learning_rate > 0.0);
    }

    #[test]
    fn test_training_config_overrides() {
        let config = TrainingConfig::new(ModelConfig::new())
            .with_epochs(2)
            .with_batch_size(16);
        assert_eq!(config.epochs, 2);
        assert_eq!(config.batch_size, 16);
    }
}
