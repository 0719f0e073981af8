use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::buffer::{Image, RGB_CHANNELS};
use crate::error::{ClassifierError, Result};

pub const NUM_CLASSES: usize = 16;
pub const IMAGE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Image,
    pub label: usize,
}

/// In-memory labelled images, all of one shape.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Vec<Sample>,
    num_classes: usize,
}

impl ImageDataset {
    pub fn new(samples: Vec<Sample>, num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(ClassifierError::invalid("num_classes", "must be > 0"));
        }

        if let Some(first) = samples.first() {
            let shape = first.image.shape();
            for (idx, sample) in samples.iter().enumerate() {
                sample.image.ensure_rgb()?;
                if sample.image.shape() != shape {
                    return Err(ClassifierError::Shape(format!(
                        "sample {} has shape {:?}, expected {:?}",
                        idx,
                        sample.image.shape(),
                        shape
                    )));
                }
                if sample.label >= num_classes {
                    return Err(ClassifierError::InvalidLabel {
                        label: sample.label,
                        num_classes,
                    });
                }
            }
        }

        Ok(Self {
            samples,
            num_classes,
        })
    }

    /// Class-dependent patterns: each class gets its own base colour and
    /// stripe period, with per-pixel noise on top.
    pub fn synthetic<R: Rng>(
        len: usize,
        image_size: usize,
        num_classes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(ClassifierError::invalid("num_classes", "must be > 0"));
        }

        let mut samples = Vec::with_capacity(len);

        for i in 0..len {
            let label = i % num_classes;
            let hue = label as f32 / num_classes as f32;
            let period = 2 + label % 4;
            let vertical = label % 2 == 0;

            let image = Image::from_fn([RGB_CHANNELS, image_size, image_size], |c, y, x| {
                let base = (hue + c as f32 / RGB_CHANNELS as f32).fract();
                let coord = if vertical { x } else { y };
                let stripe = if (coord / period) % 2 == 0 { 0.25 } else { -0.25 };
                let noise = rng.gen_range(-0.05..0.05);
                (base * 0.5 + 0.25 + stripe + noise).clamp(0.0, 1.0)
            })?;

            samples.push(Sample { image, label });
        }

        samples.shuffle(rng);
        Self::new(samples, num_classes)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn image_shape(&self) -> Option<[usize; 3]> {
        self.samples.first().map(|s| s.image.shape())
    }

    pub fn get(&self, idx: usize) -> Result<&Sample> {
        self.samples.get(idx).ok_or_else(|| {
            ClassifierError::invalid(
                "index",
                format!(
                    "{} out of bounds. Dataset has {} samples",
                    idx,
                    self.samples.len()
                ),
            )
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Split off the last `val_fraction` of samples as a validation set.
    pub fn split(self, val_fraction: f32) -> Result<(Self, Self)> {
        if !(0.0..1.0).contains(&val_fraction) {
            return Err(ClassifierError::invalid(
                "val_fraction",
                format!("must be in [0, 1), got {}", val_fraction),
            ));
        }

        let num_classes = self.num_classes;
        let val_len = (self.samples.len() as f32 * val_fraction).round() as usize;
        let mut train = self.samples;
        let val = train.split_off(train.len() - val_len);

        Ok((
            Self {
                samples: train,
                num_classes,
            },
            Self {
                samples: val,
                num_classes,
            },
        ))
    }
}
