pub mod buffer;
pub mod dataloader;
pub mod dataset;
pub mod geometry;
pub mod transforms;

pub use buffer::{Image, RGB_CHANNELS};
pub use dataloader::{ClassificationBatch, DataLoader};
pub use dataset::{ImageDataset, Sample, IMAGE_SIZE, NUM_CLASSES};
pub use geometry::{warp_affine, AffineTransform};
pub use transforms::{Augmentation, AugmentationConfig, Transform};
