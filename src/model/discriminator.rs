use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use crate::model::blocks::{ConvBnRelu, ConvBnReluConfig};

/// Configuration for the cover-vs-encoded discriminator.
#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Number of conv blocks.
    #[config(default = 3)]
    pub blocks: usize,
    /// Channel width of the conv blocks.
    #[config(default = 64)]
    pub channels: usize,
}

/// Scores how much an image looks like an unmodified cover.
///
/// The output is a pre-activation logit; callers apply the sigmoid
/// implicitly through the logits form of the binary cross entropy.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    blocks: Vec<ConvBnRelu<B>>,
    pool: AdaptiveAvgPool2d,
    linear: Linear<B>,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let mut blocks = Vec::with_capacity(self.blocks);
        blocks.push(ConvBnReluConfig::new(3, self.channels).init(device));
        for _ in 1..self.blocks {
            blocks.push(ConvBnReluConfig::new(self.channels, self.channels).init(device));
        }

        Discriminator {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            linear: LinearConfig::new(self.channels, 1).init(device),
        }
    }
}

impl<B: Backend> Discriminator<B> {
    /// Input shape: `(batch, 3, H, W)`. Output shape: `(batch, 1)`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.pool.forward(x).flatten::<2>(1, 3);
        self.linear.forward(x)
    }
}
