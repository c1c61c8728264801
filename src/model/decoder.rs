use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::blocks::{ConvBnRelu, ConvBnReluConfig};

/// Block style used inside the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBlockKind {
    /// Plain conv + batch norm + ReLU.
    Conv,
    /// Same block with a residual skip over the conv.
    Residual,
}

impl Default for DecoderBlockKind {
    fn default() -> Self {
        Self::Conv
    }
}

/// Configuration for the message decoder.
///
/// ```text
/// (batch, 3, H, W)
///   → conv blocks (3 → C → ... → C)
///   → block (C → L)
///   → adaptive average pool to (batch, L, 1, 1)
///   → Linear(L → L)
///   → decoded message: (batch, L)
/// ```
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Length of the recovered binary message.
    pub message_length: usize,
    /// Number of conv blocks before the message head.
    #[config(default = 7)]
    pub blocks: usize,
    /// Channel width of the conv blocks.
    #[config(default = 64)]
    pub channels: usize,
    /// Block style for the inner conv blocks.
    #[config(default = "DecoderBlockKind::Conv")]
    pub block_kind: DecoderBlockKind,
}

/// Recovers the embedded message from a (possibly noised) image.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    blocks: Vec<ConvBnRelu<B>>,
    to_message: ConvBnRelu<B>,
    pool: AdaptiveAvgPool2d,
    linear: Linear<B>,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        let residual = self.block_kind == DecoderBlockKind::Residual;
        let mut blocks = Vec::with_capacity(self.blocks);
        blocks.push(ConvBnReluConfig::new(3, self.channels).init(device));
        for _ in 1..self.blocks {
            blocks.push(
                ConvBnReluConfig::new(self.channels, self.channels)
                    .with_residual(residual)
                    .init(device),
            );
        }

        Decoder {
            blocks,
            to_message: ConvBnReluConfig::new(self.channels, self.message_length).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            linear: LinearConfig::new(self.message_length, self.message_length).init(device),
        }
    }
}

impl<B: Backend> Decoder<B> {
    /// Input shape: `(batch, 3, H, W)`. Output shape: `(batch, L)`.
    pub fn forward(&self, noised: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = noised;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.to_message.forward(x);
        let x = self.pool.forward(x).flatten::<2>(1, 3);
        self.linear.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_decoded_shape() {
        let device = Default::default();
        let decoder = DecoderConfig::new(8)
            .with_blocks(2)
            .with_channels(4)
            .init::<TestBackend>(&device);
        let noised = Tensor::<TestBackend, 4>::random(
            [4, 3, 12, 12],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let decoded = decoder.forward(noised);
        assert_eq!(decoded.dims(), [4, 8]);
    }

    #[test]
    fn test_residual_blocks_decode_too() {
        let device = Default::default();
        let decoder = DecoderConfig::new(8)
            .with_blocks(3)
            .with_channels(4)
            .with_block_kind(DecoderBlockKind::Residual)
            .init::<TestBackend>(&device);
        let noised = Tensor::<TestBackend, 4>::random(
            [2, 3, 12, 12],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let decoded = decoder.forward(noised);
        assert_eq!(decoded.dims(), [2, 8]);
        let data: Vec<f32> = decoded.into_data().to_vec().unwrap();
        assert!(data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_handles_cropped_input() {
        // The decoder must accept smaller spatial dims than the encoder
        // produced, since the crop noise layer shrinks the image.
        let device = Default::default();
        let decoder = DecoderConfig::new(8)
            .with_blocks(2)
            .with_channels(4)
            .init::<TestBackend>(&device);
        let noised = Tensor::<TestBackend, 4>::random(
            [2, 3, 5, 7],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(decoder.forward(noised).dims(), [2, 8]);
    }
}
