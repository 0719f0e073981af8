pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    pub best_loss: f32,
    counter: usize,
    pub stopped: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best_loss: f32::INFINITY,
            counter: 0,
            stopped: false,
        }
    }

    /// Feed one validation loss; true once `patience` epochs passed without
    /// improving on the best loss by more than `min_delta`. Non-finite losses
    /// count as no improvement.
    pub fn should_stop(&mut self, current_loss: f32) -> bool {
        if self.stopped {
            return true;
        }

        if current_loss.is_finite() && current_loss < self.best_loss - self.min_delta {
            self.best_loss = current_loss;
            self.counter = 0;
            return false;
        }

        self.counter += 1;
        if self.counter >= self.patience {
            self.stopped = true;
            log::warn!(
                "Early stopping triggered! No improvement for {} epochs (best {:.5})",
                self.patience,
                self.best_loss
            );
        }
        self.stopped
    }

    pub fn reset(&mut self) {
        self.best_loss = f32::INFINITY;
        self.counter = 0;
        self.stopped = false;
    }
}
