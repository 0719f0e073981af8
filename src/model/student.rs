use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::blocks::ConvBlock;
use super::Classifier;

const FLAT_FEATURES: usize = 2 * 2 * 288;

/// Four conv blocks with batch norm, average pooling and a dropout-regularized
/// head.
#[derive(Module, Debug)]
pub struct StudentNet<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    conv4: ConvBlock<B>,
    pool: AvgPool2d,
    fc: Linear<B>,
    drop: Dropout,
    cls: Linear<B>,
}

impl<B: Backend> StudentNet<B> {
    pub fn new(device: &B::Device, num_classes: usize) -> Self {
        Self {
            conv1: ConvBlock::new(device, 3, 12, true),    // 64 -> 32
            conv2: ConvBlock::new(device, 12, 48, true),   // 32 -> 16
            conv3: ConvBlock::new(device, 48, 144, true),  // 16 -> 8
            conv4: ConvBlock::new(device, 144, 288, true), // 8 -> 4
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(), // 4 -> 2
            fc: LinearConfig::new(FLAT_FEATURES, 128).init(device),
            drop: DropoutConfig::new(0.3).init(),
            cls: LinearConfig::new(128, num_classes).init(device),
        }
    }
}

impl<B: Backend> Classifier<B> for StudentNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, ..] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);
        let x = self.pool.forward(x);

        let x = x.reshape([batch, FLAT_FEATURES]);
        let x = relu(self.fc.forward(x));
        let x = self.drop.forward(x);
        self.cls.forward(x)
    }

    fn forward_inference(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, ..] = images.dims();

        let x = self.conv1.forward_inference(images);
        let x = self.conv2.forward_inference(x);
        let x = self.conv3.forward_inference(x);
        let x = self.conv4.forward_inference(x);
        let x = self.pool.forward(x);

        let x = x.reshape([batch, FLAT_FEATURES]);
        let x = relu(self.fc.forward(x));
        self.cls.forward(x)
    }
}
