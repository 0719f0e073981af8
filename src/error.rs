use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("shape error: {0}")]
    Shape(String),

    #[error("gradient unavailable: input image is not part of a differentiable graph")]
    GradientUnavailable,

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("label {label} out of range for {num_classes} classes")]
    InvalidLabel { label: usize, num_classes: usize },

    #[error("tensor data conversion failed: {0}")]
    Tensor(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

impl ClassifierError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
