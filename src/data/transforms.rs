use std::fmt;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::buffer::Image;
use crate::data::geometry::{warp_affine, AffineTransform};
use crate::error::{ClassifierError, Result};

/// Per-channel statistics of the animal dataset in `[0, 1]` pixel units.
pub const DATASET_MEANS: [f32; 3] = [123.0 / 255.0, 116.0 / 255.0, 97.0 / 255.0];
pub const DATASET_STDS: [f32; 3] = [54.0 / 255.0, 53.0 / 255.0, 52.0 / 255.0];

// ======================================================
// Deterministic kernels
// ======================================================

/// Translate by `(dx, dy)` pixels; positive values move content right / down.
pub fn shift(image: &Image, dx: f32, dy: f32) -> Result<Image> {
    warp_affine(image, &AffineTransform::translation(dx as f64, dy as f64))
}

/// Rotate counter-clockwise by `angle_deg` about `(W div 2, H div 2)`.
pub fn rotate(image: &Image, angle_deg: f32) -> Result<Image> {
    let center = ((image.width() / 2) as f64, (image.height() / 2) as f64);
    warp_affine(image, &AffineTransform::rotation(center, angle_deg as f64, 1.0))
}

/// Factor `0` collapses the image to its global mean; any other factor
/// multiplies every value. Factors in `(0, 1)` therefore darken the image
/// rather than pulling it towards its mean.
pub fn adjust_contrast(image: &Image, factor: f32) -> Result<Image> {
    image.ensure_rgb()?;

    if factor == 0.0 {
        let mean = image.mean();
        Ok(image.map(|_| mean))
    } else {
        Ok(image.map(|v| v * factor))
    }
}

/// Mirror left-right, every channel identically.
pub fn flip_horizontal(image: &Image) -> Result<Image> {
    image.ensure_rgb()?;

    let width = image.width();
    let planes = (0..image.channels())
        .map(|c| {
            image
                .plane(c)
                .chunks(width)
                .flat_map(|row| row.iter().rev().copied())
                .collect()
        })
        .collect();

    image.with_planes(planes)
}

/// `(v - mean[c]) / std[c]` for every value of channel `c`.
pub fn normalize(image: &Image, mean: &[f32], std: &[f32]) -> Result<Image> {
    if mean.len() != image.channels() || std.len() != image.channels() {
        return Err(ClassifierError::Shape(format!(
            "normalization has {} means / {} stds for an image with {} channels",
            mean.len(),
            std.len(),
            image.channels()
        )));
    }

    let planes = (0..image.channels())
        .map(|c| image.plane(c).iter().map(|v| (v - mean[c]) / std[c]).collect())
        .collect();

    image.with_planes(planes)
}

// ======================================================
// Randomized transforms
// ======================================================

/// A pipeline stage. Implementations keep no state between calls and draw all
/// randomness from `rng`.
pub trait Transform: fmt::Debug + Send + Sync {
    fn apply(&self, image: &Image, rng: &mut dyn RngCore) -> Result<Image>;

    fn name(&self) -> &'static str;
}

fn check_non_negative(name: &'static str, value: f32) -> Result<()> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(ClassifierError::invalid(
            name,
            format!("must be finite and >= 0, got {}", value),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shift {
    max_shift: f32,
}

impl Shift {
    pub fn new(max_shift: f32) -> Result<Self> {
        check_non_negative("max_shift", max_shift)?;
        Ok(Self { max_shift })
    }

    /// `(dx, dy)`, each uniform in `[-max_shift, max_shift]`.
    pub fn sample(&self, rng: &mut dyn RngCore) -> (f32, f32) {
        let dx = rng.gen_range(-self.max_shift..=self.max_shift);
        let dy = rng.gen_range(-self.max_shift..=self.max_shift);
        (dx, dy)
    }
}

impl Transform for Shift {
    fn apply(&self, image: &Image, rng: &mut dyn RngCore) -> Result<Image> {
        let (dx, dy) = self.sample(rng);
        log::trace!("shift dx={:.3} dy={:.3}", dx, dy);
        shift(image, dx, dy)
    }

    fn name(&self) -> &'static str {
        "Shift"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contrast {
    min_contrast: f32,
    max_contrast: f32,
}

impl Contrast {
    pub fn new(min_contrast: f32, max_contrast: f32) -> Result<Self> {
        check_non_negative("min_contrast", min_contrast)?;
        check_non_negative("max_contrast", max_contrast)?;
        if min_contrast > max_contrast {
            return Err(ClassifierError::invalid(
                "min_contrast",
                format!("{} exceeds max_contrast {}", min_contrast, max_contrast),
            ));
        }

        Ok(Self {
            min_contrast,
            max_contrast,
        })
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> f32 {
        rng.gen_range(self.min_contrast..=self.max_contrast)
    }
}

impl Transform for Contrast {
    fn apply(&self, image: &Image, rng: &mut dyn RngCore) -> Result<Image> {
        let factor = self.sample(rng);
        log::trace!("contrast factor={:.3}", factor);
        adjust_contrast(image, factor)
    }

    fn name(&self) -> &'static str {
        "Contrast"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    max_angle: f32,
}

impl Rotate {
    pub fn new(max_angle: f32) -> Result<Self> {
        check_non_negative("max_angle", max_angle)?;
        Ok(Self { max_angle })
    }

    /// Angle in degrees, uniform in `[-max_angle, max_angle]`.
    pub fn sample(&self, rng: &mut dyn RngCore) -> f32 {
        rng.gen_range(-self.max_angle..=self.max_angle)
    }
}

impl Transform for Rotate {
    fn apply(&self, image: &Image, rng: &mut dyn RngCore) -> Result<Image> {
        let angle = self.sample(rng);
        log::trace!("rotate angle={:.3}", angle);
        rotate(image, angle)
    }

    fn name(&self) -> &'static str {
        "Rotate"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalFlip {
    p: f32,
}

impl HorizontalFlip {
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(ClassifierError::invalid(
                "p",
                format!("probability must be in [0, 1], got {}", p),
            ));
        }
        Ok(Self { p })
    }
}

impl Transform for HorizontalFlip {
    fn apply(&self, image: &Image, rng: &mut dyn RngCore) -> Result<Image> {
        // gen::<f32>() is in [0, 1): p = 1 always flips, p = 0 never does
        if rng.gen::<f32>() < self.p {
            flip_horizontal(image)
        } else {
            image.ensure_rgb()?;
            Ok(image.clone())
        }
    }

    fn name(&self) -> &'static str {
        "HorizontalFlip"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(ClassifierError::Shape(format!(
                "{} means but {} stds",
                mean.len(),
                std.len()
            )));
        }
        if let Some(bad) = std.iter().find(|s| !(**s > 0.0) || !s.is_finite()) {
            return Err(ClassifierError::invalid(
                "std",
                format!("every std must be finite and > 0, got {}", bad),
            ));
        }
        Ok(Self { mean, std })
    }

    pub fn dataset() -> Self {
        Self {
            mean: DATASET_MEANS.to_vec(),
            std: DATASET_STDS.to_vec(),
        }
    }
}

impl Transform for Normalize {
    fn apply(&self, image: &Image, _rng: &mut dyn RngCore) -> Result<Image> {
        normalize(image, &self.mean, &self.std)
    }

    fn name(&self) -> &'static str {
        "Normalize"
    }
}

// ======================================================
// Pipeline
// ======================================================

/// Ordered transform sequence owning its random source.
pub struct Augmentation<R: RngCore = ChaCha8Rng> {
    transforms: Vec<Box<dyn Transform>>,
    rng: R,
}

impl Augmentation<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> Augmentation<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            transforms: Vec::new(),
            rng,
        }
    }

    pub fn then<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn apply(&mut self, image: &Image) -> Result<Image> {
        let mut current = image.clone();
        for transform in &self.transforms {
            current = transform.apply(&current, &mut self.rng)?;
        }
        Ok(current)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl<R: RngCore> fmt::Debug for Augmentation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Augmentation")
            .field("transforms", &self.names())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// When false only normalization runs.
    pub enabled: bool,
    pub min_contrast: f32,
    pub max_contrast: f32,
    pub max_shift: f32,
    pub max_angle: f32,
    pub flip_prob: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_contrast: 0.3,
            max_contrast: 0.9,
            max_shift: 5.0,
            max_angle: 10.0,
            flip_prob: 0.5,
            mean: DATASET_MEANS,
            std: DATASET_STDS,
        }
    }
}

impl AugmentationConfig {
    /// Normalization only, for validation and adversarial evaluation.
    pub fn none() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// contrast → shift → rotate → flip → normalize
    pub fn build<R: RngCore>(&self, rng: R) -> Result<Augmentation<R>> {
        let mut pipeline = Augmentation::with_rng(rng);

        if self.enabled {
            pipeline = pipeline
                .then(Contrast::new(self.min_contrast, self.max_contrast)?)
                .then(Shift::new(self.max_shift)?)
                .then(Rotate::new(self.max_angle)?)
                .then(HorizontalFlip::new(self.flip_prob)?);
        }

        let pipeline = pipeline.then(Normalize::new(self.mean.to_vec(), self.std.to_vec())?);
        log::debug!("built augmentation pipeline: {:?}", pipeline.names());
        Ok(pipeline)
    }

    pub fn build_seeded(&self, seed: u64) -> Result<Augmentation> {
        self.build(ChaCha8Rng::seed_from_u64(seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn pattern() -> Image {
        Image::from_fn([3, 8, 8], |c, y, x| ((c + 2 * y + 3 * x) % 11) as f32 / 10.0).unwrap()
    }

    fn all_variants() -> Vec<Box<dyn Transform>> {
        vec![
            Box::new(Shift::new(3.0).unwrap()),
            Box::new(Contrast::new(0.0, 2.0).unwrap()),
            Box::new(Rotate::new(45.0).unwrap()),
            Box::new(HorizontalFlip::new(0.5).unwrap()),
            Box::new(Normalize::dataset()),
        ]
    }

    #[test]
    fn test_all_transforms_preserve_shape() {
        let mut rng = rng();
        for shape in [[3, 8, 8], [3, 5, 9], [3, 64, 64]] {
            let img = Image::filled(shape, 0.5).unwrap();
            for transform in all_variants() {
                for _ in 0..5 {
                    let out = transform.apply(&img, &mut rng).unwrap();
                    assert_eq!(out.shape(), shape, "{}", transform.name());
                }
            }
        }
    }

    #[test]
    fn test_transforms_do_not_touch_input() {
        let img = pattern();
        let before = img.clone();
        let mut rng = rng();
        for transform in all_variants() {
            let _ = transform.apply(&img, &mut rng).unwrap();
        }
        assert_eq!(img, before);
    }

    #[test]
    fn test_transforms_reject_non_rgb() {
        let gray = Image::zeros([1, 4, 4]).unwrap();
        let mut rng = rng();
        for transform in all_variants() {
            assert!(
                matches!(transform.apply(&gray, &mut rng), Err(ClassifierError::Shape(_))),
                "{}",
                transform.name()
            );
        }
    }

    #[test]
    fn test_flip_always_with_p_one() {
        let img = pattern();
        let flip = HorizontalFlip::new(1.0).unwrap();
        let mut rng = rng();
        for _ in 0..20 {
            let out = flip.apply(&img, &mut rng).unwrap();
            assert_eq!(out, flip_horizontal(&img).unwrap());
        }
    }

    #[test]
    fn test_flip_never_with_p_zero() {
        let img = pattern();
        let flip = HorizontalFlip::new(0.0).unwrap();
        let mut rng = rng();
        for _ in 0..20 {
            assert_eq!(flip.apply(&img, &mut rng).unwrap(), img);
        }
    }

    #[test]
    fn test_flip_moves_vertical_stripe() {
        let img = Image::from_fn([3, 6, 7], |_, _, x| if x == 1 { 1.0 } else { 0.0 }).unwrap();
        let flip = HorizontalFlip::new(1.0).unwrap();
        let out = flip.apply(&img, &mut rng()).unwrap();

        for c in 0..3 {
            for y in 0..6 {
                for x in 0..7 {
                    let expected = if x == 5 { 1.0 } else { 0.0 };
                    assert_eq!(out.get(c, y, x), expected);
                }
            }
        }
    }

    #[test]
    fn test_contrast_zero_collapses_to_mean() {
        let img = pattern();
        let mean = img.mean();
        let out = Contrast::new(0.0, 0.0).unwrap().apply(&img, &mut rng()).unwrap();
        assert!(out.data().iter().all(|&v| v == mean));
    }

    #[test]
    fn test_contrast_one_on_zero_image() {
        let img = Image::zeros([3, 4, 4]).unwrap();
        let out = Contrast::new(1.0, 1.0).unwrap().apply(&img, &mut rng()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_contrast_one_is_identity() {
        let img = pattern();
        assert_eq!(adjust_contrast(&img, 1.0).unwrap(), img);
    }

    #[test]
    fn test_contrast_below_one_scales_around_zero() {
        // literal behaviour: multiply by the factor, so the mean is not preserved
        let img = Image::filled([3, 2, 2], 0.8).unwrap();
        let out = adjust_contrast(&img, 0.5).unwrap();
        assert!((out.mean() - 0.4).abs() < 1e-6);
        assert!((out.mean() - img.mean()).abs() > 0.1);
    }

    #[test]
    fn test_zero_shift_is_identity() {
        let img = pattern();
        assert_eq!(shift(&img, 0.0, 0.0).unwrap(), img);

        let degenerate = Shift::new(0.0).unwrap();
        assert_eq!(degenerate.apply(&img, &mut rng()).unwrap(), img);
    }

    #[test]
    fn test_integer_shift_moves_content() {
        let img = pattern();
        let out = shift(&img, 2.0, -1.0).unwrap();
        for c in 0..3 {
            assert_eq!(out.get(c, 3, 5), img.get(c, 4, 3));
            assert_eq!(out.get(c, 3, 0), 0.0);
            assert_eq!(out.get(c, 7, 4), 0.0);
        }
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let img = pattern();
        assert_eq!(rotate(&img, 0.0).unwrap(), img);

        let degenerate = Rotate::new(0.0).unwrap();
        assert_eq!(degenerate.apply(&img, &mut rng()).unwrap(), img);
    }

    #[test]
    fn test_rotation_uses_floor_center() {
        // 4x4 image rotates about (2, 2): that pixel is a fixed point
        let img = Image::from_fn([3, 4, 4], |_, y, x| if y == 2 && x == 2 { 1.0 } else { 0.0 })
            .unwrap();
        let out = rotate(&img, 90.0).unwrap();
        for c in 0..3 {
            assert!((out.get(c, 2, 2) - 1.0).abs() < 1e-4);
        }
    }

    fn draws<T>(n: usize, mut f: impl FnMut(&mut ChaCha8Rng) -> T) -> Vec<T> {
        let mut rng = rng();
        (0..n).map(|_| f(&mut rng)).collect()
    }

    fn extremes(values: &[f32]) -> (f32, f32) {
        values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    #[test]
    fn test_shift_draws_stay_in_range() {
        let shift = Shift::new(5.0).unwrap();
        let offsets: Vec<f32> = draws(2000, |rng| shift.sample(rng))
            .into_iter()
            .flat_map(|(dx, dy)| [dx, dy])
            .collect();

        let (lo, hi) = extremes(&offsets);
        assert!(lo >= -5.0 && hi <= 5.0);
        assert!(lo < -4.5 && hi > 4.5);
    }

    #[test]
    fn test_rotate_draws_are_symmetric() {
        let rotate = Rotate::new(10.0).unwrap();
        let angles = draws(2000, |rng| rotate.sample(rng));

        let (lo, hi) = extremes(&angles);
        assert!(lo >= -10.0 && hi <= 10.0);
        assert!(lo < -9.5 && hi > 9.5);

        let mean = angles.iter().sum::<f32>() / angles.len() as f32;
        assert!(mean.abs() < 0.5, "mean angle {}", mean);
    }

    #[test]
    fn test_contrast_draws_stay_in_range() {
        let contrast = Contrast::new(0.3, 0.9).unwrap();
        let factors = draws(2000, |rng| contrast.sample(rng));

        let (lo, hi) = extremes(&factors);
        assert!(lo >= 0.3 && hi <= 0.9);
        assert!(lo < 0.35 && hi > 0.85);
    }

    #[test]
    fn test_apply_uses_sampled_parameters() {
        let img = pattern();

        let shift_t = Shift::new(3.0).unwrap();
        let (dx, dy) = shift_t.sample(&mut rng());
        assert_eq!(shift_t.apply(&img, &mut rng()).unwrap(), shift(&img, dx, dy).unwrap());

        let rotate_t = Rotate::new(30.0).unwrap();
        let angle = rotate_t.sample(&mut rng());
        assert_eq!(rotate_t.apply(&img, &mut rng()).unwrap(), rotate(&img, angle).unwrap());

        let contrast_t = Contrast::new(0.3, 0.9).unwrap();
        let factor = contrast_t.sample(&mut rng());
        assert_eq!(
            contrast_t.apply(&img, &mut rng()).unwrap(),
            adjust_contrast(&img, factor).unwrap()
        );
    }

    #[test]
    fn test_shift_moves_a_dot_by_the_drawn_offset() {
        // integer offsets so the dot lands on a single pixel
        let mut rng = rng();
        let dot = Image::from_fn([3, 16, 16], |_, y, x| if y == 8 && x == 8 { 1.0 } else { 0.0 })
            .unwrap();
        for _ in 0..20 {
            let dx = rng.gen_range(-5i32..=5);
            let dy = rng.gen_range(-5i32..=5);
            let out = shift(&dot, dx as f32, dy as f32).unwrap();
            let y = (8 + dy) as usize;
            let x = (8 + dx) as usize;
            assert!((out.get(0, y, x) - 1.0).abs() < 1e-6);
            assert!((out.mean() - dot.mean()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_per_channel() {
        let img = Image::from_fn([3, 2, 2], |c, _, _| c as f32).unwrap();
        let out = normalize(&img, &[0.0, 1.0, 1.0], &[1.0, 1.0, 0.5]).unwrap();
        assert!(out.plane(0).iter().all(|&v| v == 0.0));
        assert!(out.plane(1).iter().all(|&v| v == 0.0));
        assert!(out.plane(2).iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Shift::new(-1.0).is_err());
        assert!(Rotate::new(f32::NAN).is_err());
        assert!(Contrast::new(0.9, 0.3).is_err());
        assert!(Contrast::new(-0.1, 0.3).is_err());
        assert!(HorizontalFlip::new(1.5).is_err());
        assert!(Normalize::new(vec![0.0; 3], vec![1.0, 0.0, 1.0]).is_err());
        assert!(matches!(
            Normalize::new(vec![0.0; 3], vec![1.0; 2]),
            Err(ClassifierError::Shape(_))
        ));
    }

    #[test]
    fn test_pipeline_order() {
        let pipeline = AugmentationConfig::default().build_seeded(0).unwrap();
        assert_eq!(
            pipeline.names(),
            vec!["Contrast", "Shift", "Rotate", "HorizontalFlip", "Normalize"]
        );

        let eval = AugmentationConfig::none().build_seeded(0).unwrap();
        assert_eq!(eval.names(), vec!["Normalize"]);
    }

    #[test]
    fn test_pipeline_is_reproducible_with_seed() {
        let img = pattern();
        let config = AugmentationConfig::default();

        let mut a = config.build_seeded(42).unwrap();
        let mut b = config.build_seeded(42).unwrap();
        for _ in 0..3 {
            assert_eq!(a.apply(&img).unwrap(), b.apply(&img).unwrap());
        }
    }

    #[test]
    fn test_pipeline_draws_fresh_randomness() {
        let img = pattern();
        let mut pipeline = Augmentation::seeded(3).then(Contrast::new(0.1, 2.0).unwrap());
        let first = pipeline.apply(&img).unwrap();
        let second = pipeline.apply(&img).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = AugmentationConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AugmentationConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
