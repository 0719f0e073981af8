//! One-step gradient-sign (FGSM) adversarial perturbations.
//!
//! The perturbed image is `clamp(x + ε·sign(∂L/∂x), 0, 1)` and the reported
//! noise is what was actually added after clamping, `perturbed − x`, which can
//! be smaller than `ε` wherever the clamp cut it.
//!
//! Every forward pass here is `Classifier::forward_inference`, so attacking a
//! network never draws dropout masks or moves batch-norm statistics.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{ClassifierError, Result};
use crate::model::{Classifier, Criterion};
use crate::training::step::count_correct;

pub struct AdversarialExample<B: Backend> {
    pub perturbed: Tensor<B, 4>,
    pub noise: Tensor<B, 4>,
}

/// Summary of an attack on a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackReport {
    pub epsilon: f32,
    pub total: usize,
    pub correct_before: usize,
    pub correct_after: usize,
    pub mean_abs_noise: f32,
}

impl AttackReport {
    pub fn flipped(&self) -> usize {
        self.correct_before.saturating_sub(self.correct_after)
    }
}

fn check_epsilon(epsilon: f32) -> Result<()> {
    if !(epsilon >= 0.0) || !epsilon.is_finite() {
        return Err(ClassifierError::invalid(
            "epsilon",
            format!("must be finite and >= 0, got {}", epsilon),
        ));
    }
    Ok(())
}

/// Perturb `image` along the sign of the loss gradient.
///
/// `image` must have been marked with `require_grad()` and fed through the
/// network to produce `output`; the gradient is taken through that graph.
pub fn fgsm<B, C>(
    image: Tensor<B, 4>,
    output: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    criterion: &C,
    epsilon: f32,
) -> Result<AdversarialExample<B::InnerBackend>>
where
    B: AutodiffBackend,
    C: Criterion<B>,
{
    check_epsilon(epsilon)?;

    if !image.is_require_grad() {
        return Err(ClassifierError::GradientUnavailable);
    }

    let loss = criterion.loss(output, labels);
    let grads = loss.backward();
    let grad = image
        .grad(&grads)
        .ok_or(ClassifierError::GradientUnavailable)?;

    let original = image.inner();
    let perturbed = (original.clone() + grad.sign() * epsilon).clamp(0.0, 1.0);
    let noise = perturbed.clone() - original;

    Ok(AdversarialExample { perturbed, noise })
}

/// Run the inference-mode forward pass on a fresh copy of `images` with
/// gradient tracking and attack it.
pub fn generate<B, M, C>(
    model: &M,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    criterion: &C,
    epsilon: f32,
) -> Result<AdversarialExample<B::InnerBackend>>
where
    B: AutodiffBackend,
    M: Classifier<B>,
    C: Criterion<B>,
{
    let images = images.detach().require_grad();
    let output = model.forward_inference(images.clone());
    fgsm(images, output, labels, criterion, epsilon)
}

/// Attack a batch and compare the model's accuracy before and after.
pub fn evaluate_attack<B, M, C>(
    model: &M,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    criterion: &C,
    epsilon: f32,
) -> Result<(AdversarialExample<B::InnerBackend>, AttackReport)>
where
    B: AutodiffBackend,
    M: Classifier<B>,
    C: Criterion<B>,
{
    let [total, ..] = images.dims();
    let inner_labels = labels.clone().inner();

    let images = images.detach().require_grad();
    let output = model.forward_inference(images.clone());
    let correct_before = count_correct(output.clone().inner(), inner_labels.clone());

    let example = fgsm(images, output, labels, criterion, epsilon)?;

    let perturbed = Tensor::<B, 4>::from_inner(example.perturbed.clone());
    let adv_output = model.forward_inference(perturbed).inner();
    let correct_after = count_correct(adv_output, inner_labels);

    let mean_abs_noise = example.noise.clone().abs().mean().into_scalar().elem::<f32>();

    let report = AttackReport {
        epsilon,
        total,
        correct_before,
        correct_after,
        mean_abs_noise,
    };
    log::info!(
        "FGSM eps={:.4}: accuracy {}/{} -> {}/{} (mean |noise| {:.5})",
        epsilon,
        correct_before,
        total,
        correct_after,
        total,
        mean_abs_noise
    );

    Ok((example, report))
}
