use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::blocks::ConvBlock;
use super::Classifier;

const FLAT_FEATURES: usize = 8 * 8 * 24;

/// Three plain conv blocks and a two-layer classifier head.
#[derive(Module, Debug)]
pub struct BaselineNet<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    fc: Linear<B>,
    cls: Linear<B>,
}

impl<B: Backend> BaselineNet<B> {
    pub fn new(device: &B::Device, num_classes: usize) -> Self {
        Self {
            conv1: ConvBlock::new(device, 3, 6, false),   // 64 -> 32
            conv2: ConvBlock::new(device, 6, 12, false),  // 32 -> 16
            conv3: ConvBlock::new(device, 12, 24, false), // 16 -> 8
            fc: LinearConfig::new(FLAT_FEATURES, 128).init(device),
            cls: LinearConfig::new(128, num_classes).init(device),
        }
    }
}

impl<B: Backend> Classifier<B> for BaselineNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, ..] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        let x = x.reshape([batch, FLAT_FEATURES]);
        let x = relu(self.fc.forward(x));
        self.cls.forward(x)
    }

    // no dropout or batch norm: both modes coincide
    fn forward_inference(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        Classifier::forward(self, images)
    }
}
