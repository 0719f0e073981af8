use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::transforms::AugmentationConfig;
use crate::data::{IMAGE_SIZE, NUM_CLASSES};
use crate::error::{ClassifierError, Result};
use crate::model::NetworkKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Model
    pub network: NetworkKind,
    pub num_classes: usize,
    pub img_size: usize,

    // Training
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: Option<f32>,
    pub val_split: f32,
    pub seed: u64,

    // Early stopping
    pub patience: usize,
    pub min_delta: f32,

    // Data
    pub augmentation: AugmentationConfig,

    // Checkpoints are written only when set
    pub save_dir: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            network: NetworkKind::Student,
            num_classes: NUM_CLASSES,
            img_size: IMAGE_SIZE,
            epochs: 75,
            batch_size: 128,
            learning_rate: 0.005,
            weight_decay: None,
            val_split: 0.2,
            seed: 42,
            patience: 10,
            min_delta: 0.001,
            augmentation: AugmentationConfig::default(),
            save_dir: None,
        }
    }
}

impl TrainingConfig {
    /// Plain baseline run: no augmentation beyond normalization.
    pub fn baseline() -> Self {
        Self {
            network: NetworkKind::Baseline,
            batch_size: 64,
            epochs: 20,
            learning_rate: 1e-3,
            augmentation: AugmentationConfig::none(),
            ..Self::default()
        }
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrainingConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClassifierError::invalid("batch_size", "must be > 0"));
        }
        if self.num_classes == 0 {
            return Err(ClassifierError::invalid("num_classes", "must be > 0"));
        }
        if self.img_size != IMAGE_SIZE {
            return Err(ClassifierError::invalid(
                "img_size",
                format!("networks expect {}x{} inputs, got {}", IMAGE_SIZE, IMAGE_SIZE, self.img_size),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ClassifierError::invalid(
                "learning_rate",
                format!("must be > 0, got {}", self.learning_rate),
            ));
        }
        if !(0.0..1.0).contains(&self.val_split) {
            return Err(ClassifierError::invalid(
                "val_split",
                format!("must be in [0, 1), got {}", self.val_split),
            ));
        }
        Ok(())
    }
}
