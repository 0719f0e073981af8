//! Networks and the loss seam used by training and adversarial generation.

pub mod baseline;
pub mod blocks;
pub mod student;

use burn::nn::loss::CrossEntropyLoss;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

pub use baseline::BaselineNet;
pub use student::StudentNet;

/// Image batch `[N, 3, 64, 64]` → class scores `[N, num_classes]`.
pub trait Classifier<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Inference-mode scores on any backend: no dropout, batch norm on its
    /// running statistics, no module state touched. Deterministic, and still
    /// differentiable with respect to `images`.
    fn forward_inference(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Differentiable scalar loss over a batch of scores and integer labels.
pub trait Criterion<B: Backend> {
    fn loss(&self, scores: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

impl<B: Backend> Criterion<B> for CrossEntropyLoss<B> {
    fn loss(&self, scores: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        self.forward(scores, labels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Baseline,
    Student,
}
