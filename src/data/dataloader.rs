use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::dataset::ImageDataset;
use crate::data::transforms::Augmentation;
use crate::error::{ClassifierError, Result};

pub struct ClassificationBatch<B: Backend> {
    /// `[N, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// `[N]`, each in `[0, num_classes)`
    pub labels: Tensor<B, 1, Int>,
    pub batch_size: usize,
}

impl<B: Backend> ClassificationBatch<B> {
    pub fn new(images: Tensor<B, 4>, labels: Tensor<B, 1, Int>) -> Result<Self> {
        let [batch_size, ..] = images.dims();
        let [num_labels] = labels.dims();

        if batch_size != num_labels {
            return Err(ClassifierError::Shape(format!(
                "{} images but {} labels",
                batch_size, num_labels
            )));
        }

        Ok(Self {
            images,
            labels,
            batch_size,
        })
    }
}

/// Finite, restartable batch iterator. Every sample goes through the
/// augmentation pipeline each time it is visited.
pub struct DataLoader<B: Backend> {
    dataset: ImageDataset,
    batch_size: usize,
    shuffle: bool,
    device: B::Device,
    augmentation: Augmentation,
    shuffle_rng: ChaCha8Rng,
    indices: Vec<usize>,
    current_idx: usize,
}

impl<B: Backend> DataLoader<B> {
    pub fn new(
        dataset: ImageDataset,
        batch_size: usize,
        shuffle: bool,
        augmentation: Augmentation,
        seed: u64,
        device: B::Device,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(ClassifierError::invalid("batch_size", "must be > 0"));
        }

        let mut loader = Self {
            indices: (0..dataset.len()).collect(),
            dataset,
            batch_size,
            shuffle,
            device,
            augmentation,
            shuffle_rng: ChaCha8Rng::seed_from_u64(seed),
            current_idx: 0,
        };
        loader.reset();
        Ok(loader)
    }

    /// Rewind for a new epoch, reshuffling when enabled.
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.shuffle_rng);
        }
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    fn next_batch(&mut self) -> Result<ClassificationBatch<B>> {
        let end_idx = (self.current_idx + self.batch_size).min(self.dataset.len());
        let batch_indices = self.indices[self.current_idx..end_idx].to_vec();
        self.current_idx = end_idx;

        let mut images_vec = Vec::new();
        let mut labels_vec = Vec::with_capacity(batch_indices.len());
        let mut shape = [0usize; 3];

        for idx in batch_indices {
            let sample = self.dataset.get(idx)?;
            let image = self.augmentation.apply(&sample.image)?;
            shape = image.shape();
            images_vec.extend_from_slice(image.data());
            labels_vec.push(sample.label as i64);
        }

        let n = labels_vec.len();
        let [c, h, w] = shape;
        log::debug!("batch of {} images {}x{}x{}", n, c, h, w);

        let images = Tensor::<B, 4>::from_data(TensorData::new(images_vec, [n, c, h, w]), &self.device);
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels_vec, [n]), &self.device);

        ClassificationBatch::new(images, labels)
    }
}

impl<B: Backend> Iterator for DataLoader<B> {
    type Item = Result<ClassificationBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.dataset.len() {
            return None;
        }
        Some(self.next_batch())
    }
}
