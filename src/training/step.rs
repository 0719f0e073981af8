use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::data::ClassificationBatch;
use crate::error::{ClassifierError, Result};
use crate::model::{Classifier, Criterion};

/// What one optimisation step reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f32,
    pub correct: usize,
    pub total: usize,
}

/// Number of rows whose highest score sits at the labelled class.
pub fn count_correct<B: Backend>(scores: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    let [n, _] = scores.dims();
    let predictions = scores.argmax(1).reshape([n]);
    predictions
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Every label must index one of the `classes` score columns.
fn check_labels<B: Backend>(labels: Tensor<B, 1, Int>, classes: usize) -> Result<()> {
    let [n] = labels.dims();
    if n == 0 {
        return Ok(());
    }

    let min = labels.clone().min().into_scalar().elem::<i64>();
    let max = labels.max().into_scalar().elem::<i64>();
    if min < 0 || max >= classes as i64 {
        let label = if min < 0 { min } else { max };
        return Err(ClassifierError::Shape(format!(
            "label {} does not index into {} score columns",
            label, classes
        )));
    }
    Ok(())
}

/// Forward, score, backward and update on one batch.
///
/// Gradients come from a fresh `backward()` each call and are handed to the
/// optimizer once, so nothing from an earlier step leaks into this update.
/// Failures inside the framework are not caught here.
pub fn train_step<B, M, C, O>(
    model: M,
    batch: ClassificationBatch<B>,
    criterion: &C,
    optimizer: &mut O,
    learning_rate: f64,
) -> Result<(M, StepOutput)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    C: Criterion<B>,
    O: Optimizer<M, B>,
{
    let total = batch.batch_size;

    let scores = model.forward(batch.images);
    let [rows, classes] = scores.dims();
    if rows != total {
        return Err(ClassifierError::Shape(format!(
            "model produced {} score rows for a batch of {}",
            rows, total
        )));
    }
    check_labels(batch.labels.clone().inner(), classes)?;

    let correct = count_correct(scores.clone().inner(), batch.labels.clone().inner());
    let loss = criterion.loss(scores, batch.labels);
    let loss_value = loss.clone().into_scalar().elem::<f32>();

    if !loss_value.is_finite() {
        log::warn!("non-finite loss {} on a batch of {}", loss_value, total);
    }

    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optimizer.step(learning_rate, model, grads);

    log::debug!(
        "step: loss={:.5} correct={}/{}",
        loss_value,
        correct,
        total
    );

    Ok((
        model,
        StepOutput {
            loss: loss_value,
            correct,
            total,
        },
    ))
}
