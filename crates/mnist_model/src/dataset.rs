//! Dataset splits and batching for Burn training.

use std::sync::Arc;

use burn::data::dataset::vision::{MnistDataset, MnistItem};
use burn::data::dataset::{Dataset, InMemDataset};
use burn::prelude::*;
use burn::tensor::TensorData;
use tracing::info;

/// Height and width of an MNIST image.
pub const IMAGE_SIZE: usize = 28;

/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

/// Mean and standard deviation of the MNIST training pixels, scaled to [0, 1].
const PIXEL_MEAN: f32 = 0.1307;
const PIXEL_STD: f32 = 0.3081;

/// A view over a subset of an underlying image dataset.
#[derive(Clone)]
pub struct ImageDataset {
    source: Arc<dyn Dataset<MnistItem>>,
    indices: Vec<usize>,
}

impl ImageDataset {
    /// Creates a view over all items of `source`.
    pub fn new(source: Arc<dyn Dataset<MnistItem>>) -> Self {
        let indices = (0..source.len()).collect();
        Self { source, indices }
    }

    /// Creates a view over the given items of `source`.
    pub fn subset(source: Arc<dyn Dataset<MnistItem>>, indices: Vec<usize>) -> Self {
        Self { source, indices }
    }

    /// Creates a dataset holding `items` in memory.
    #[must_use]
    pub fn from_items(items: Vec<MnistItem>) -> Self {
        Self::new(Arc::new(InMemDataset::new(items)))
    }
}

impl std::fmt::Debug for ImageDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDataset")
            .field("len", &self.indices.len())
            .finish_non_exhaustive()
    }
}

impl Dataset<MnistItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        self.indices.get(index).and_then(|&i| self.source.get(i))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Training, validation and test splits.
#[derive(Debug, Clone)]
pub struct MnistData {
    pub train: ImageDataset,
    pub valid: ImageDataset,
    pub test: ImageDataset,
}

impl MnistData {
    /// Loads MNIST, downloading it into the Burn cache on first use.
    ///
    /// `validation_size` training images, picked by a shuffle seeded with
    /// `seed`, are held out for validation.
    #[must_use]
    pub fn load(validation_size: usize, seed: u64) -> Self {
        info!("Loading MNIST dataset...");
        let train: Arc<dyn Dataset<MnistItem>> = Arc::new(MnistDataset::train());
        let test: Arc<dyn Dataset<MnistItem>> = Arc::new(MnistDataset::test());

        let data = Self::split(train, test, validation_size, seed);
        info!(
            train = data.train.len(),
            valid = data.valid.len(),
            test = data.test.len(),
            "Loaded MNIST"
        );
        data
    }

    /// Splits `train` into training and validation sets.
    pub fn split(
        train: Arc<dyn Dataset<MnistItem>>,
        test: Arc<dyn Dataset<MnistItem>>,
        validation_size: usize,
        seed: u64,
    ) -> Self {
        let mut indices: Vec<usize> = (0..train.len()).collect();
        shuffle_indices(&mut indices, seed);

        let train_indices = indices.split_off(validation_size.min(indices.len()));

        Self {
            valid: ImageDataset::subset(Arc::clone(&train), indices),
            train: ImageDataset::subset(train, train_indices),
            test: ImageDataset::new(test),
        }
    }
}

/// A batch of images and their labels.
#[derive(Debug, Clone)]
pub struct MnistBatch<B: Backend> {
    /// Normalized images of shape `[batch_size, 28, 28]`.
    pub images: Tensor<B, 3>,
    /// Class labels of shape `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating training batches.
#[derive(Debug, Clone)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> MnistBatcher<B> {
    /// Creates a new batcher for the given device.
    #[must_use]
    pub const fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Creates a batch from a vector of items.
    pub fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let batch_size = items.len();

        let mut pixels = Vec::with_capacity(batch_size * IMAGE_SIZE * IMAGE_SIZE);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            for row in &item.image {
                pixels.extend(row.iter().map(|&p| (p / 255.0 - PIXEL_MEAN) / PIXEL_STD));
            }
            labels.push(i64::from(item.label));
        }

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, IMAGE_SIZE, IMAGE_SIZE]);

        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [batch_size]).convert::<B::IntElem>(),
            &self.device,
        );

        MnistBatch { images, targets }
    }
}

/// Shuffles indices using a simple LCG-based shuffle.
pub fn shuffle_indices(indices: &mut [usize], seed: u64) {
    // Fisher-Yates with an LCG
    let mut rng_state = seed.wrapping_add(12345);

    for i in (1..indices.len()).rev() {
        rng_state = rng_state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let j = ((rng_state >> 33) as usize) % (i + 1);
        indices.swap(i, j);
    }
}
