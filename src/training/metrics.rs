use super::step::StepOutput;

/// Loss and accuracy accumulated over the batches of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochMetrics {
    pub loss_sum: f64,
    pub batches: usize,
    pub correct: usize,
    pub total: usize,
}

impl EpochMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: &StepOutput) {
        self.loss_sum += step.loss as f64;
        self.batches += 1;
        self.correct += step.correct;
        self.total += step.total;
    }

    /// Mean of the per-batch losses.
    pub fn loss(&self) -> f32 {
        if self.batches == 0 {
            return 0.0;
        }
        (self.loss_sum / self.batches as f64) as f32
    }

    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f32 / self.total as f32
    }
}

/// One row of the training history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EpochMetrics,
    pub val: EpochMetrics,
}
