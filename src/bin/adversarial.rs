use std::path::PathBuf;

use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use animal_classifier::data::IMAGE_SIZE;
use animal_classifier::model::{BaselineNet, NetworkKind};
use animal_classifier::training::{Trainer, TrainingConfig};
use animal_classifier::{evaluate_attack, AugmentationConfig, Image, ImageDataset};

type MyBackend = Autodiff<NdArray>;

#[derive(Parser, Debug)]
#[command(author, version, about = "FGSM adversarial examples against a small classifier")]
struct Args {
    /// Perturbation size, in pixel units of [0, 1]
    #[arg(short, long, default_value_t = 0.03)]
    epsilon: f32,

    /// Synthetic samples to generate
    #[arg(long, default_value_t = 256)]
    samples: usize,

    /// Epochs to train the target network before attacking it
    #[arg(long, default_value_t = 3)]
    train_epochs: usize,

    /// Number of held-out images to attack
    #[arg(long, default_value_t = 16)]
    attack: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Save original / perturbed / noise PNGs here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let device = Default::default();

    // The attack clamps to [0, 1], so the network is trained on raw pixels.
    let config = TrainingConfig {
        network: NetworkKind::Baseline,
        epochs: args.train_epochs,
        batch_size: 32,
        learning_rate: 1e-3,
        seed: args.seed,
        val_split: 0.25,
        augmentation: AugmentationConfig {
            enabled: false,
            mean: [0.0; 3],
            std: [1.0; 3],
            ..AugmentationConfig::default()
        },
        ..TrainingConfig::default()
    };

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let dataset = ImageDataset::synthetic(args.samples, IMAGE_SIZE, config.num_classes, &mut rng)?;
    let (train, val) = dataset.split(config.val_split)?;

    println!("Training target network for {} epochs...", config.epochs);
    let model = BaselineNet::<MyBackend>::new(&device, config.num_classes);
    let mut trainer = Trainer::new(model, config, device.clone());
    trainer.fit(&train, &val)?;
    let model = trainer.into_model();

    let targets: Vec<_> = val.samples().iter().take(args.attack).collect();
    anyhow::ensure!(!targets.is_empty(), "no held-out samples to attack");

    let images = Tensor::stack::<4>(
        targets
            .iter()
            .map(|s| s.image.to_tensor::<MyBackend>(&device))
            .collect(),
        0,
    );
    let labels = Tensor::<MyBackend, 1, Int>::from_data(
        TensorData::new(
            targets.iter().map(|s| s.label as i64).collect::<Vec<_>>(),
            [targets.len()],
        ),
        &device,
    );

    let criterion = CrossEntropyLossConfig::new().init::<MyBackend>(&device);
    let (example, report) = evaluate_attack(&model, images, labels, &criterion, args.epsilon)?;

    println!();
    println!("FGSM Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Epsilon: {:.4}", report.epsilon);
    println!("Correct before: {}/{}", report.correct_before, report.total);
    println!("Correct after: {}/{}", report.correct_after, report.total);
    println!("Flipped: {}", report.flipped());
    println!("Mean |noise|: {:.5}", report.mean_abs_noise);

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;

        // Map noise in [-eps, eps] onto [0, 1] so it is visible.
        let noise_scale = if args.epsilon > 0.0 { 0.5 / args.epsilon } else { 0.0 };

        for (i, sample) in targets.iter().enumerate() {
            let perturbed = Image::from_tensor(
                example.perturbed.clone().slice([i..i + 1]).squeeze::<3>(0),
            )?;
            let noise = Image::from_tensor(example.noise.clone().slice([i..i + 1]).squeeze::<3>(0))?
                .map(|v| v * noise_scale + 0.5);

            sample
                .image
                .to_rgb8()?
                .save(dir.join(format!("{:03}_original.png", i)))?;
            perturbed
                .to_rgb8()?
                .save(dir.join(format!("{:03}_perturbed.png", i)))?;
            noise
                .to_rgb8()?
                .save(dir.join(format!("{:03}_noise.png", i)))?;
        }
        println!("Saved {} image triplets to {}", targets.len(), dir.display());
    }

    Ok(())
}
