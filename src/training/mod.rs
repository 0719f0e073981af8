pub mod config;
pub mod early_stopping;
pub mod metrics;
pub mod step;
pub mod trainer;

pub use config::TrainingConfig;
pub use early_stopping::EarlyStopping;
pub use metrics::{EpochMetrics, EpochReport};
pub use step::{count_correct, train_step, StepOutput};
pub use trainer::Trainer;
