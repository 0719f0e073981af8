use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// 3×3 stride-2 convolution followed by ReLU and, optionally, batch norm.
/// Each block halves the spatial size.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        batch_norm: bool,
    ) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            bn: batch_norm.then(|| BatchNormConfig::new(out_channels).init(device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = activation::relu(self.conv.forward(x));
        match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        }
    }

    /// Like `forward`, but batch norm always uses its running statistics and
    /// never updates them, even on an autodiff backend. Gradients still flow
    /// back to `x`.
    pub fn forward_inference(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = activation::relu(self.conv.forward(x));
        let Some(bn) = &self.bn else {
            return x;
        };

        let [_, channels, _, _] = x.dims();
        let shape = [1, channels, 1, 1];
        let mean = bn.running_mean.value().reshape(shape);
        let std = bn
            .running_var
            .value()
            .reshape(shape)
            .add_scalar(bn.epsilon)
            .sqrt();

        x.sub(mean)
            .div(std)
            .mul(bn.gamma.val().reshape(shape))
            .add(bn.beta.val().reshape(shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    #[test]
    fn test_block_halves_spatial_size() {
        let device = Default::default();
        let block = ConvBlock::<NdArray>::new(&device, 3, 6, true);
        let out = block.forward(Tensor::zeros([2, 3, 64, 64], &device));
        assert_eq!(out.dims(), [2, 6, 32, 32]);
    }

    #[test]
    fn test_relu_output_without_norm() {
        let device = Default::default();
        let block = ConvBlock::<NdArray>::new(&device, 3, 4, false);
        let x = Tensor::<NdArray, 4>::random(
            [1, 3, 8, 8],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let out = block.forward(x);
        let min = out.min().into_scalar().elem::<f32>();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_inference_matches_plain_backend_forward() {
        let device = Default::default();
        let block = ConvBlock::<NdArray>::new(&device, 3, 6, true);
        let x = Tensor::<NdArray, 4>::random([2, 3, 8, 8], Distribution::Uniform(0.0, 1.0), &device);

        let expected = block.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = block.forward_inference(x).into_data().to_vec::<f32>().unwrap();
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_inference_leaves_running_stats_alone() {
        let device = Default::default();
        let block = ConvBlock::<Autodiff<NdArray>>::new(&device, 3, 6, true);
        let running_mean = |b: &ConvBlock<Autodiff<NdArray>>| {
            b.bn.as_ref()
                .unwrap()
                .running_mean
                .value()
                .into_data()
                .to_vec::<f32>()
                .unwrap()
        };
        let x = Tensor::<Autodiff<NdArray>, 4>::random([2, 3, 8, 8], Distribution::Uniform(0.0, 1.0), &device);

        let before = running_mean(&block);
        let _ = block.forward_inference(x.clone());
        assert_eq!(running_mean(&block), before);

        // the training-mode pass does move them
        let _ = block.forward(x);
        assert_ne!(running_mean(&block), before);
    }
}
