use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::blocks::{ConvBnRelu, ConvBnReluConfig};

/// How the encoder produces the encoded image from its final features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkVariant {
    /// The output convolution emits the encoded image directly.
    Direct,
    /// The output convolution emits a watermark residual that is added
    /// onto the cover image.
    Residual,
}

impl Default for NetworkVariant {
    fn default() -> Self {
        Self::Direct
    }
}

/// Configuration for the message-embedding encoder.
///
/// ```text
/// (batch, 3, H, W), (batch, L)
///   → feature blocks (3 → C → ... → C)
///   → concat [message expanded to (batch, L, H, W), features, cover]
///   → merge block (L + C + 3 → C)
///   → 1x1 conv (C → 3), plus the cover for the residual variant
///   → encoded: (batch, 3, H, W)
/// ```
#[derive(Config, Debug)]
pub struct EncoderConfig {
    /// Length of the embedded binary message.
    pub message_length: usize,
    /// Number of feature blocks before the merge.
    #[config(default = 4)]
    pub blocks: usize,
    /// Channel width of the feature blocks.
    #[config(default = 64)]
    pub channels: usize,
    /// Output composition variant.
    #[config(default = "NetworkVariant::Direct")]
    pub variant: NetworkVariant,
}

/// Embeds a fixed-length binary message into a cover image.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    features: Vec<ConvBnRelu<B>>,
    merge: ConvBnRelu<B>,
    pub(crate) out: Conv2d<B>,
    residual_output: bool,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let mut features = Vec::with_capacity(self.blocks);
        features.push(ConvBnReluConfig::new(3, self.channels).init(device));
        for _ in 1..self.blocks {
            features.push(ConvBnReluConfig::new(self.channels, self.channels).init(device));
        }

        Encoder {
            features,
            merge: ConvBnReluConfig::new(self.message_length + self.channels + 3, self.channels)
                .init(device),
            out: Conv2dConfig::new([self.channels, 3], [1, 1]).init(device),
            residual_output: self.variant == NetworkVariant::Residual,
        }
    }
}

impl<B: Backend> Encoder<B> {
    /// Embed `messages` into `images`.
    ///
    /// Input shapes: `(batch, 3, H, W)` and `(batch, L)`.
    /// Output shape: `(batch, 3, H, W)`.
    pub fn forward(&self, images: Tensor<B, 4>, messages: Tensor<B, 2>) -> Tensor<B, 4> {
        let [_, _, height, width] = images.dims();

        let mut x = images.clone();
        for block in &self.features {
            x = block.forward(x);
        }

        // Broadcast each message bit over the full spatial extent.
        let expanded = messages
            .unsqueeze_dim::<3>(2)
            .unsqueeze_dim::<4>(3)
            .repeat_dim(2, height)
            .repeat_dim(3, width);

        let merged = Tensor::cat(vec![expanded, x, images.clone()], 1);
        let watermarked = self.out.forward(self.merge.forward(merged));
        if self.residual_output {
            images + watermarked
        } else {
            watermarked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn small_encoder(variant: NetworkVariant) -> Encoder<TestBackend> {
        EncoderConfig::new(8)
            .with_blocks(2)
            .with_channels(4)
            .with_variant(variant)
            .init(&Default::default())
    }

    #[test]
    fn test_encoded_shape_matches_cover() {
        let device = Default::default();
        for variant in [NetworkVariant::Direct, NetworkVariant::Residual] {
            let encoder = small_encoder(variant);
            let images = Tensor::<TestBackend, 4>::random(
                [4, 3, 12, 12],
                Distribution::Normal(0.0, 1.0),
                &device,
            );
            let messages =
                Tensor::<TestBackend, 2>::random([4, 8], Distribution::Bernoulli(0.5), &device);
            let encoded = encoder.forward(images, messages);
            assert_eq!(encoded.dims(), [4, 3, 12, 12]);
        }
    }

    #[test]
    fn test_different_messages_change_encoding() {
        let device = Default::default();
        let encoder = small_encoder(NetworkVariant::Direct);
        let images = Tensor::<TestBackend, 4>::random(
            [1, 3, 12, 12],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let zeros = Tensor::<TestBackend, 2>::zeros([1, 8], &device);
        let ones = Tensor::<TestBackend, 2>::ones([1, 8], &device);

        let encoded_zeros = encoder.forward(images.clone(), zeros);
        let encoded_ones = encoder.forward(images, ones);
        let diff: f32 = (encoded_zeros - encoded_ones).abs().sum().into_scalar().elem();
        assert!(diff > 1e-6, "different messages should produce different encodings");
    }

    #[test]
    fn test_non_square_images() {
        let device = Default::default();
        let encoder = small_encoder(NetworkVariant::Residual);
        let images = Tensor::<TestBackend, 4>::random(
            [2, 3, 8, 16],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let messages =
            Tensor::<TestBackend, 2>::random([2, 8], Distribution::Bernoulli(0.5), &device);
        assert_eq!(encoder.forward(images, messages).dims(), [2, 3, 8, 16]);
    }
}
