use burn::prelude::*;
use image::{Rgb, RgbImage};

use crate::error::{ClassifierError, Result};

/// Number of colour channels every pipeline stage expects.
pub const RGB_CHANNELS: usize = 3;

/// Channel-first (C×H×W) `f32` pixel buffer.
///
/// Planes are stored one after another, each plane row-major. Values are in
/// `[0, 1]` when converted from 8-bit pixels and arbitrary after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Image {
    /// Wrap `data` as an image of shape `[channels, height, width]`.
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self> {
        let [channels, height, width] = shape;
        let expected = channels * height * width;

        if channels == 0 || height == 0 || width == 0 {
            return Err(ClassifierError::Shape(format!(
                "image dimensions must be non-zero, got {:?}",
                shape
            )));
        }

        if data.len() != expected {
            return Err(ClassifierError::Shape(format!(
                "buffer of {} values does not match shape {:?} ({} values)",
                data.len(),
                shape,
                expected
            )));
        }

        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    pub fn filled(shape: [usize; 3], value: f32) -> Result<Self> {
        Self::new(shape, vec![value; shape.iter().product()])
    }

    pub fn zeros(shape: [usize; 3]) -> Result<Self> {
        Self::filled(shape, 0.0)
    }

    /// Build an image by evaluating `f(channel, y, x)` for every pixel.
    pub fn from_fn<F>(shape: [usize; 3], mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize, usize) -> f32,
    {
        let [channels, height, width] = shape;
        let mut data = Vec::with_capacity(channels * height * width);

        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    data.push(f(c, y, x));
                }
            }
        }

        Self::new(shape, data)
    }

    /// 8-bit RGB → CHW floats in `[0, 1]`. Empty images are rejected.
    pub fn from_rgb8(img: &RgbImage) -> Result<Self> {
        let (w, h) = img.dimensions();
        let (width, height) = (w as usize, h as usize);
        let plane = width * height;
        let mut data = vec![0.0f32; plane * RGB_CHANNELS];

        for (idx, pixel) in img.pixels().enumerate() {
            for c in 0..RGB_CHANNELS {
                data[c * plane + idx] = pixel[c] as f32 / 255.0;
            }
        }

        Self::new([RGB_CHANNELS, height, width], data)
    }

    /// CHW floats → 8-bit RGB, clamping to `[0, 1]` first.
    pub fn to_rgb8(&self) -> Result<RgbImage> {
        self.ensure_rgb()?;

        let plane = self.plane_len();
        let mut out = RgbImage::new(self.width as u32, self.height as u32);

        for (idx, pixel) in out.pixels_mut().enumerate() {
            let mut rgb = [0u8; RGB_CHANNELS];
            for (c, value) in rgb.iter_mut().enumerate() {
                let v = self.data[c * plane + idx].clamp(0.0, 1.0);
                *value = (v * 255.0).round() as u8;
            }
            *pixel = Rgb(rgb);
        }

        Ok(out)
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// One channel as a row-major `H×W` slice.
    pub fn plane(&self, channel: usize) -> &[f32] {
        let len = self.plane_len();
        &self.data[channel * len..(channel + 1) * len]
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[(channel * self.height + y) * self.width + x]
    }

    /// Mean over every pixel of every channel.
    pub fn mean(&self) -> f32 {
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Apply `f` to every value, returning a new buffer of the same shape.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Reassemble an image from per-channel planes of this image's size.
    pub fn with_planes(&self, planes: Vec<Vec<f32>>) -> Result<Self> {
        if planes.len() != self.channels {
            return Err(ClassifierError::Shape(format!(
                "expected {} planes, got {}",
                self.channels,
                planes.len()
            )));
        }

        let data: Vec<f32> = planes.into_iter().flatten().collect();
        Self::new(self.shape(), data)
    }

    pub fn ensure_rgb(&self) -> Result<()> {
        if self.channels != RGB_CHANNELS {
            return Err(ClassifierError::Shape(format!(
                "expected {} channels, got {} (shape {:?})",
                RGB_CHANNELS,
                self.channels,
                self.shape()
            )));
        }
        Ok(())
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        Tensor::<B, 3>::from_data(TensorData::new(self.data.clone(), self.shape()), device)
    }

    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 3>) -> Result<Self> {
        let shape = tensor.dims();
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ClassifierError::Tensor(format!("{:?}", e)))?;
        Self::new(shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_rejects_mismatched_buffer() {
        let result = Image::new([3, 4, 4], vec![0.0; 47]);
        assert!(matches!(result, Err(ClassifierError::Shape(_))));
    }

    #[test]
    fn test_rejects_zero_dimension() {
        assert!(Image::zeros([3, 0, 4]).is_err());
    }

    #[test]
    fn test_ensure_rgb() {
        let gray = Image::zeros([1, 4, 4]).unwrap();
        assert!(matches!(gray.ensure_rgb(), Err(ClassifierError::Shape(_))));
        assert!(Image::zeros([3, 4, 4]).unwrap().ensure_rgb().is_ok());
    }

    #[test]
    fn test_chw_layout() {
        let img = Image::from_fn([3, 2, 3], |c, y, x| (c * 100 + y * 10 + x) as f32).unwrap();
        assert_eq!(img.get(2, 1, 2), 212.0);
        assert_eq!(img.plane(1), &[100.0, 101.0, 102.0, 110.0, 111.0, 112.0]);
    }

    #[test]
    fn test_mean_covers_all_channels() {
        let img = Image::from_fn([3, 2, 2], |c, _, _| c as f32).unwrap();
        assert!((img.mean() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rgb8_conversion() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 51]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 102]));

        let img = Image::from_rgb8(&rgb).unwrap();
        assert_eq!(img.shape(), [3, 1, 2]);
        assert_eq!(img.get(0, 0, 0), 1.0);
        assert_eq!(img.get(1, 0, 1), 1.0);
        assert!((img.get(2, 0, 0) - 0.2).abs() < 1e-6);

        assert_eq!(img.to_rgb8().unwrap(), rgb);
    }

    #[test]
    fn test_empty_rgb8_rejected() {
        let rgb = RgbImage::new(0, 0);
        assert!(matches!(Image::from_rgb8(&rgb), Err(ClassifierError::Shape(_))));
    }

    #[test]
    fn test_to_rgb8_clamps() {
        let img = Image::from_fn([3, 1, 1], |c, _, _| c as f32 - 1.0).unwrap();
        let rgb = img.to_rgb8().unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_tensor_conversion() {
        let device = Default::default();
        let img = Image::from_fn([3, 2, 2], |c, y, x| (c + y + x) as f32 * 0.1).unwrap();

        let tensor = img.to_tensor::<NdArray>(&device);
        assert_eq!(tensor.dims(), [3, 2, 2]);

        let back = Image::from_tensor(tensor).unwrap();
        assert_eq!(back, img);
    }
}
