use std::path::PathBuf;

use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::prelude::*;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use animal_classifier::model::{BaselineNet, Classifier, NetworkKind, StudentNet};
use animal_classifier::training::{EpochReport, Trainer, TrainingConfig};
use animal_classifier::ImageDataset;

type MyBackend = Autodiff<NdArray>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a 16-class image classifier on synthetic data")]
struct Args {
    /// YAML training config; defaults are used when missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network to train (overrides config)
    #[arg(short, long, value_enum)]
    network: Option<NetworkKind>,

    /// Number of epochs (overrides config)
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size (overrides config)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Synthetic samples to generate before the train/val split
    #[arg(long, default_value_t = 512)]
    samples: usize,

    /// RNG seed for data, shuffling and augmentation (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for checkpoints (overrides config)
    #[arg(long)]
    save_dir: Option<String>,

    /// Write the effective config to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_yaml(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    if let Some(network) = args.network {
        config.network = network;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.save_dir.is_some() {
        config.save_dir = args.save_dir.clone();
    }
    config.validate()?;

    if let Some(path) = &args.dump_config {
        config.save(path)?;
        println!("Wrote config to {}", path.display());
        return Ok(());
    }

    println!("Training Configuration:");
    println!("  Network: {:?}", config.network);
    println!("  Epochs: {}", config.epochs);
    println!("  Batch size: {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Augmentation: {}", config.augmentation.enabled);
    println!("  Image size: {}x{}", config.img_size, config.img_size);
    println!();

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let dataset = ImageDataset::synthetic(args.samples, config.img_size, config.num_classes, &mut rng)?;
    let (train, val) = dataset.split(config.val_split)?;
    log::info!("Dataset: {} train / {} val", train.len(), val.len());

    let device = Default::default();
    let history = match config.network {
        NetworkKind::Baseline => {
            let model = BaselineNet::<MyBackend>::new(&device, config.num_classes);
            run(model, config, device, &train, &val)?
        }
        NetworkKind::Student => {
            let model = StudentNet::<MyBackend>::new(&device, config.num_classes);
            run(model, config, device, &train, &val)?
        }
    };

    print_history(&history);
    Ok(())
}

fn run<M>(
    model: M,
    config: TrainingConfig,
    device: <MyBackend as Backend>::Device,
    train: &ImageDataset,
    val: &ImageDataset,
) -> anyhow::Result<Vec<EpochReport>>
where
    M: AutodiffModule<MyBackend> + Classifier<MyBackend>,
    M::InnerModule: Classifier<NdArray>,
{
    let mut trainer = Trainer::new(model, config, device);
    let history = trainer.fit(train, val)?;
    Ok(history)
}

fn print_history(history: &[EpochReport]) {
    println!();
    println!(
        "{:<8} {:<12} {:<10} {:<12} {:<10}",
        "Epoch", "Train Loss", "Train Acc", "Val Loss", "Val Acc"
    );
    println!("{}", "=".repeat(56));

    for report in history {
        println!(
            "{:<8} {:<12.6} {:<10.3} {:<12.6} {:<10.3}",
            report.epoch,
            report.train.loss(),
            report.train.accuracy(),
            report.val.loss(),
            report.val.accuracy()
        );
    }
}
