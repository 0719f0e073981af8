pub mod adversarial;
pub mod data;
pub mod error;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use adversarial::{evaluate_attack, fgsm, generate, AdversarialExample, AttackReport};
pub use data::{Augmentation, AugmentationConfig, DataLoader, Image, ImageDataset};
pub use error::{ClassifierError, Result};
pub use model::{BaselineNet, Classifier, Criterion, NetworkKind, StudentNet};
pub use training::{train_step, EarlyStopping, StepOutput, Trainer, TrainingConfig};
