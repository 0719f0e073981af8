use std::path::PathBuf;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{Adam, AdamConfig};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::transforms::AugmentationConfig;
use crate::data::{DataLoader, ImageDataset};
use crate::error::{ClassifierError, Result};
use crate::model::{Classifier, Criterion};
use crate::training::metrics::{EpochMetrics, EpochReport};
use crate::training::step::{count_correct, train_step, StepOutput};
use crate::training::{EarlyStopping, TrainingConfig};

pub struct Trainer<B: AutodiffBackend, M: AutodiffModule<B>> {
    model: M,
    criterion: CrossEntropyLoss<B>,
    config: TrainingConfig,
    device: B::Device,
    early_stopping: EarlyStopping,
    optimizer: OptimizerAdaptor<Adam, M, B>,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    M::InnerModule: Classifier<B::InnerBackend>,
{
    pub fn new(model: M, config: TrainingConfig, device: B::Device) -> Self {
        let criterion = CrossEntropyLossConfig::new().init::<B>(&device);
        let early_stopping = EarlyStopping::new(config.patience, config.min_delta);

        let optimizer = AdamConfig::new()
            .with_weight_decay(config.weight_decay.map(WeightDecayConfig::new))
            .init::<B, M>();

        Self {
            model,
            criterion,
            config,
            device,
            early_stopping,
            optimizer,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// One pass over `loader`, stepping the optimizer on every batch.
    pub fn train_epoch(&mut self, loader: &mut DataLoader<B>) -> Result<EpochMetrics> {
        loader.reset();
        let mut metrics = EpochMetrics::new();

        for (batch_idx, batch) in loader.enumerate() {
            let (model, step) = train_step(
                self.model.clone(),
                batch?,
                &self.criterion,
                &mut self.optimizer,
                self.config.learning_rate,
            )?;
            self.model = model;
            metrics.record(&step);

            if (batch_idx + 1) % 10 == 0 {
                log::debug!("batch {}: loss={:.4}", batch_idx + 1, step.loss);
            }
        }

        Ok(metrics)
    }

    /// Loss and accuracy of the inference-mode model; no parameters change.
    pub fn evaluate(&self, loader: &mut DataLoader<B::InnerBackend>) -> Result<EpochMetrics> {
        loader.reset();
        let model = self.model.valid();
        let criterion = CrossEntropyLossConfig::new().init::<B::InnerBackend>(&self.device);
        let mut metrics = EpochMetrics::new();

        for batch in loader {
            let batch = batch?;
            let scores = model.forward(batch.images);
            let correct = count_correct(scores.clone(), batch.labels.clone());
            let loss = criterion
                .loss(scores, batch.labels)
                .into_scalar()
                .elem::<f32>();

            metrics.record(&StepOutput {
                loss,
                correct,
                total: batch.batch_size,
            });
        }

        Ok(metrics)
    }

    /// Train for up to `config.epochs`, validating after each epoch and
    /// stopping early once validation loss stalls.
    pub fn fit(&mut self, train: &ImageDataset, val: &ImageDataset) -> Result<Vec<EpochReport>> {
        self.config.validate()?;

        let mut train_loader: DataLoader<B> = DataLoader::new(
            train.clone(),
            self.config.batch_size,
            true,
            self.config.augmentation.build_seeded(self.config.seed)?,
            self.config.seed,
            self.device.clone(),
        )?;

        let eval_augmentation = AugmentationConfig {
            enabled: false,
            ..self.config.augmentation.clone()
        };
        let mut val_loader: DataLoader<B::InnerBackend> = DataLoader::new(
            val.clone(),
            self.config.batch_size,
            false,
            eval_augmentation.build_seeded(self.config.seed)?,
            self.config.seed,
            self.device.clone(),
        )?;

        log::info!(
            "Training {:?} for {} epochs: {} train / {} val samples, batch {}",
            self.config.network,
            self.config.epochs,
            train.len(),
            val.len(),
            self.config.batch_size
        );

        let pb = ProgressBar::new(self.config.epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        self.early_stopping.reset();
        let mut best_val = f32::INFINITY;
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();

            let train_metrics = self.train_epoch(&mut train_loader)?;
            let val_metrics = self.evaluate(&mut val_loader)?;

            pb.set_message(format!(
                "Epoch {}: Train={:.4}, Val={:.4}",
                epoch,
                train_metrics.loss(),
                val_metrics.loss()
            ));
            pb.inc(1);

            log::info!(
                "epoch {}/{}: train loss {:.4} acc {:.3} | val loss {:.4} acc {:.3} ({:.2}s)",
                epoch,
                self.config.epochs,
                train_metrics.loss(),
                train_metrics.accuracy(),
                val_metrics.loss(),
                val_metrics.accuracy(),
                epoch_start.elapsed().as_secs_f32()
            );

            history.push(EpochReport {
                epoch,
                train: train_metrics,
                val: val_metrics,
            });

            if val.is_empty() {
                continue;
            }

            let val_loss = val_metrics.loss();
            if val_loss.is_finite() && val_loss < best_val {
                best_val = val_loss;
                self.save_checkpoint("best")?;
            }

            if self.early_stopping.should_stop(val_loss) {
                log::info!("Early stopping at epoch {}", epoch);
                break;
            }
        }

        self.save_checkpoint("final")?;
        pb.finish_with_message("Training completed!");

        Ok(history)
    }

    fn checkpoint_dir(&self, name: &str) -> Option<PathBuf> {
        self.config
            .save_dir
            .as_ref()
            .map(|dir| PathBuf::from(dir).join(name))
    }

    /// Writes `<save_dir>/<name>/model.bin` and `config.yaml`. A no-op when no
    /// `save_dir` is configured.
    pub fn save_checkpoint(&self, name: &str) -> Result<()> {
        let Some(dir) = self.checkpoint_dir(name) else {
            return Ok(());
        };
        std::fs::create_dir_all(&dir)?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .map_err(|e| ClassifierError::Checkpoint(format!("{:?}", e)))?;
        self.config.save(dir.join("config.yaml"))?;

        log::info!("Saved checkpoint '{}' to {}", name, dir.display());
        Ok(())
    }

    pub fn load_checkpoint(&mut self, name: &str) -> Result<()> {
        let dir = self.checkpoint_dir(name).ok_or_else(|| {
            ClassifierError::invalid("save_dir", "no checkpoint directory configured")
        })?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model = self
            .model
            .clone()
            .load_file(dir.join("model"), &recorder, &self.device)
            .map_err(|e| ClassifierError::Checkpoint(format!("{:?}", e)))?;

        log::info!("Loaded checkpoint '{}' from {}", name, dir.display());
        Ok(())
    }
}
