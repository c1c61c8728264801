use burn::module::Ignored;
use burn::prelude::*;

use crate::model::decoder::{Decoder, DecoderBlockKind, DecoderConfig};
use crate::model::encoder::{Encoder, EncoderConfig, NetworkVariant};
use crate::noise::{NoiseConfig, Noiser};

/// Configuration for the full encoder → noiser → decoder pipeline.
#[derive(Config, Debug)]
pub struct EncoderDecoderConfig {
    /// Length of the embedded binary message.
    pub message_length: usize,
    /// Output composition variant of the encoder.
    #[config(default = "NetworkVariant::Direct")]
    pub variant: NetworkVariant,
    /// Encoder feature block count.
    #[config(default = 4)]
    pub encoder_blocks: usize,
    /// Encoder channel width.
    #[config(default = 64)]
    pub encoder_channels: usize,
    /// Decoder block count.
    #[config(default = 7)]
    pub decoder_blocks: usize,
    /// Decoder channel width.
    #[config(default = 64)]
    pub decoder_channels: usize,
    /// Decoder block style.
    #[config(default = "DecoderBlockKind::Conv")]
    pub decoder_block_type: DecoderBlockKind,
}

/// Message embedding and recovery under noise, trained end to end.
///
/// The noiser owns no parameters; it is carried inside the module so a
/// single forward pass yields the encoded, noised, and decoded triple.
#[derive(Module, Debug)]
pub struct EncoderDecoder<B: Backend> {
    pub(crate) encoder: Encoder<B>,
    noiser: Ignored<Noiser>,
    pub(crate) decoder: Decoder<B>,
}

impl EncoderDecoderConfig {
    pub fn init<B: Backend>(&self, noise: &NoiseConfig, device: &B::Device) -> EncoderDecoder<B> {
        EncoderDecoder {
            encoder: EncoderConfig::new(self.message_length)
                .with_blocks(self.encoder_blocks)
                .with_channels(self.encoder_channels)
                .with_variant(self.variant)
                .init(device),
            noiser: Ignored(Noiser::new(noise)),
            decoder: DecoderConfig::new(self.message_length)
                .with_blocks(self.decoder_blocks)
                .with_channels(self.decoder_channels)
                .with_block_kind(self.decoder_block_type)
                .init(device),
        }
    }
}

impl<B: Backend> EncoderDecoder<B> {
    /// Embed, distort, and recover in one pass.
    ///
    /// Returns `(encoded_images, noised_images, decoded_messages)` with
    /// shapes `(batch, 3, H, W)`, `(batch, 3, H', W')` (the crop layer
    /// may shrink spatial dims), and `(batch, L)`.
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
        messages: Tensor<B, 2>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 2>) {
        let encoded = self.encoder.forward(images.clone(), messages);
        let noised = self.noiser.apply(&images, encoded.clone());
        let decoded = self.decoder.forward(noised.clone());
        (encoded, noised, decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::NoiseKind;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn small_config() -> EncoderDecoderConfig {
        EncoderDecoderConfig::new(8)
            .with_encoder_blocks(2)
            .with_encoder_channels(4)
            .with_decoder_blocks(2)
            .with_decoder_channels(4)
    }

    #[test]
    fn test_forward_triple_shapes() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&NoiseConfig::identity(), &device);
        let images = Tensor::<TestBackend, 4>::random(
            [4, 3, 12, 12],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let messages =
            Tensor::<TestBackend, 2>::random([4, 8], Distribution::Bernoulli(0.5), &device);

        let (encoded, noised, decoded) = model.forward(images, messages);
        assert_eq!(encoded.dims(), [4, 3, 12, 12]);
        assert_eq!(noised.dims(), [4, 3, 12, 12]);
        assert_eq!(decoded.dims(), [4, 8]);
    }

    #[test]
    fn test_identity_noise_passes_encoded_through() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&NoiseConfig::identity(), &device);
        let images = Tensor::<TestBackend, 4>::random(
            [2, 3, 12, 12],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let messages =
            Tensor::<TestBackend, 2>::random([2, 8], Distribution::Bernoulli(0.5), &device);

        let (encoded, noised, _) = model.forward(images, messages);
        let diff: f32 = (encoded - noised).abs().sum().into_scalar().elem();
        assert!(diff < 1e-7, "identity noise must not alter the encoded image");
    }

    #[test]
    fn test_forward_under_crop_noise() {
        let device = Default::default();
        let noise = NoiseConfig {
            layers: vec![NoiseKind::Crop { ratio: 0.5 }],
        };
        let model = small_config().init::<TestBackend>(&noise, &device);
        let images = Tensor::<TestBackend, 4>::random(
            [2, 3, 16, 16],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let messages =
            Tensor::<TestBackend, 2>::random([2, 8], Distribution::Bernoulli(0.5), &device);

        let (encoded, noised, decoded) = model.forward(images, messages);
        assert_eq!(encoded.dims(), [2, 3, 16, 16]);
        let [_, _, noised_h, noised_w] = noised.dims();
        assert!(noised_h < 16 && noised_w < 16);
        assert_eq!(decoded.dims(), [2, 8]);
    }
}
