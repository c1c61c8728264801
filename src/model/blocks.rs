use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// Configuration for the shared conv building block.
#[derive(Config, Debug)]
pub struct ConvBnReluConfig {
    /// Input channel count.
    pub d_input: usize,
    /// Output channel count.
    pub d_output: usize,
    /// Add the block input back onto the pre-activation output. Only
    /// honored when input and output channel counts match.
    #[config(default = false)]
    pub residual: bool,
}

/// 3x3 convolution + batch norm + ReLU, stride 1, padding 1.
///
/// Spatial dimensions are preserved:
/// `(batch, d_input, H, W) -> (batch, d_output, H, W)`.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
    residual: bool,
}

impl ConvBnReluConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBnRelu<B> {
        ConvBnRelu {
            conv: Conv2dConfig::new([self.d_input, self.d_output], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            norm: BatchNormConfig::new(self.d_output).init(device),
            activation: Relu::new(),
            residual: self.residual && self.d_input == self.d_output,
        }
    }
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input.clone());
        let x = self.norm.forward(x);
        let x = if self.residual { x + input } else { x };
        self.activation.forward(x)
    }
}
