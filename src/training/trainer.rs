//! Per-batch adversarial trainer with one optimizer per sub-model.
//!
//! Every batch runs two phases in a fixed order: the discriminator phase
//! accumulates gradients from its cover and (detached) encoded losses and
//! steps its own optimizer; the generator phase re-scores the non-detached
//! encoded images, composes the weighted joint objective, and steps the
//! encoder-decoder optimizer. The encoder-decoder forward pass runs once
//! per batch and is shared by both phases.

use std::fmt;
use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;

use crate::config::TrainerConfig;
use crate::error::Error;
use crate::model::discriminator::{Discriminator, DiscriminatorConfig};
use crate::model::encoder_decoder::{EncoderDecoder, EncoderDecoderConfig};
use crate::training::loss::{
    binary_cross_entropy_with_logits, bitwise_error_rate, mean_squared_error,
};
use crate::training::metrics::BatchMetrics;

/// Raw per-batch tensors returned for downstream visualization.
#[derive(Debug, Clone)]
pub struct BatchOutputs<B: Backend> {
    pub encoded_images: Tensor<B, 4>,
    pub noised_images: Tensor<B, 4>,
    pub decoded_messages: Tensor<B, 2>,
}

/// Owns the two sub-models and one Adam optimizer per sub-model.
///
/// Parameters are only ever mutated through the respective optimizer:
/// the discriminator phase steps only discriminator parameters and the
/// generator phase steps only encoder-decoder parameters.
pub struct WatermarkTrainer<B: AutodiffBackend> {
    device: B::Device,
    encoder_decoder: EncoderDecoder<B>,
    discriminator: Discriminator<B>,
    optimizer_enc_dec: OptimizerAdaptor<Adam, EncoderDecoder<B>, B>,
    optimizer_discrim: OptimizerAdaptor<Adam, Discriminator<B>, B>,
    learning_rate: f64,
    adv_loss_weight: f64,
    enc_loss_weight: f64,
    dec_loss_weight: f64,
    message_length: usize,
    cover_label: f64,
    encoded_label: f64,
}

impl<B: AutodiffBackend> core::fmt::Debug for WatermarkTrainer<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WatermarkTrainer")
            .field("learning_rate", &self.learning_rate)
            .field("adv_loss_weight", &self.adv_loss_weight)
            .field("enc_loss_weight", &self.enc_loss_weight)
            .field("dec_loss_weight", &self.dec_loss_weight)
            .field("message_length", &self.message_length)
            .field("cover_label", &self.cover_label)
            .field("encoded_label", &self.encoded_label)
            .finish_non_exhaustive()
    }
}

impl<B: AutodiffBackend> WatermarkTrainer<B> {
    /// Build both sub-models on `device` with freshly initialized
    /// parameters and one Adam optimizer each, using default
    /// adaptive-gradient hyperparameters.
    pub fn new(config: &TrainerConfig, device: &B::Device) -> Result<Self, Error> {
        config.validate()?;

        let encoder_decoder = EncoderDecoderConfig::new(config.message_length)
            .with_variant(config.network)
            .with_encoder_blocks(config.encoder_blocks)
            .with_encoder_channels(config.encoder_channels)
            .with_decoder_blocks(config.decoder_blocks)
            .with_decoder_channels(config.decoder_channels)
            .with_decoder_block_type(config.decoder_block_type)
            .init::<B>(&config.noise, device);
        let discriminator = DiscriminatorConfig::new()
            .with_blocks(config.discriminator_blocks)
            .with_channels(config.discriminator_channels)
            .init::<B>(device);

        Ok(Self {
            device: device.clone(),
            encoder_decoder,
            discriminator,
            optimizer_enc_dec: AdamConfig::new().init(),
            optimizer_discrim: AdamConfig::new().init(),
            learning_rate: config.learning_rate,
            adv_loss_weight: config.adv_loss_weight,
            enc_loss_weight: config.enc_loss_weight,
            dec_loss_weight: config.dec_loss_weight,
            message_length: config.message_length,
            cover_label: 1.0,
            encoded_label: 0.0,
        })
    }

    pub fn message_length(&self) -> usize {
        self.message_length
    }

    pub fn encoder_decoder(&self) -> &EncoderDecoder<B> {
        &self.encoder_decoder
    }

    pub fn discriminator(&self) -> &Discriminator<B> {
        &self.discriminator
    }

    /// Train both sub-models on one batch.
    ///
    /// Runs the discriminator phase (cover loss, detached encoded loss,
    /// one accumulated optimizer step) and then the generator phase
    /// (fresh discriminator score on the non-detached encoded images,
    /// weighted joint loss, one optimizer step), in that order.
    ///
    /// # Returns
    /// The seven named metrics plus the raw `(encoded, noised, decoded)`
    /// tensors of the shared forward pass.
    pub fn train_on_batch(
        &mut self,
        images: Tensor<B, 4>,
        messages: Tensor<B, 2>,
    ) -> Result<(BatchMetrics, BatchOutputs<B>), Error> {
        let batch_size = self.check_batch(&images, &messages)?;

        let d_target_cover: Tensor<B, 2> =
            Tensor::full([batch_size, 1], self.cover_label, &self.device);
        let d_target_encoded: Tensor<B, 2> =
            Tensor::full([batch_size, 1], self.encoded_label, &self.device);
        // The generator wants encoded images scored as covers.
        let g_target_encoded: Tensor<B, 2> =
            Tensor::full([batch_size, 1], self.cover_label, &self.device);

        // ---- Discriminator phase -------------------------------------
        let mut d_grads = GradientsAccumulator::new();

        let d_on_cover = self.discriminator.forward(images.clone());
        let d_loss_cover = binary_cross_entropy_with_logits(d_on_cover, d_target_cover);
        let d_cover_val: f64 = d_loss_cover.clone().into_scalar().elem();
        d_grads.accumulate(
            &self.discriminator,
            GradientsParams::from_grads(d_loss_cover.backward(), &self.discriminator),
        );

        // Single encoder-decoder forward pass, shared with the generator
        // phase below.
        let (encoded_images, noised_images, decoded_messages) =
            self.encoder_decoder.forward(images.clone(), messages.clone());

        // Detached copy: the generator receives no gradient from this loss.
        let d_on_encoded = self
            .discriminator
            .forward(encoded_images.clone().detach());
        let d_loss_encoded = binary_cross_entropy_with_logits(d_on_encoded, d_target_encoded);
        let d_encoded_val: f64 = d_loss_encoded.clone().into_scalar().elem();
        d_grads.accumulate(
            &self.discriminator,
            GradientsParams::from_grads(d_loss_encoded.backward(), &self.discriminator),
        );

        self.discriminator = self.optimizer_discrim.step(
            self.learning_rate,
            self.discriminator.clone(),
            d_grads.grads(),
        );

        // ---- Generator phase -----------------------------------------
        // Fresh discriminator evaluation; gradients flow back into the
        // encoder this time.
        let d_on_encoded_for_gen = self.discriminator.forward(encoded_images.clone());
        let g_loss_adv = binary_cross_entropy_with_logits(d_on_encoded_for_gen, g_target_encoded);
        let g_loss_enc = mean_squared_error(encoded_images.clone(), images);
        let g_loss_dec = mean_squared_error(decoded_messages.clone(), messages.clone());

        // Extract scalar values before backward
        let adv_val: f64 = g_loss_adv.clone().into_scalar().elem();
        let enc_val: f64 = g_loss_enc.clone().into_scalar().elem();
        let dec_val: f64 = g_loss_dec.clone().into_scalar().elem();

        let g_loss = g_loss_adv.mul_scalar(self.adv_loss_weight)
            + g_loss_enc.mul_scalar(self.enc_loss_weight)
            + g_loss_dec.mul_scalar(self.dec_loss_weight);
        let joint_val: f64 = g_loss.clone().into_scalar().elem();

        // The tape reaches discriminator parameters too, but the filter
        // below keeps encoder-decoder gradients only and the step touches
        // nothing else.
        let g_grads = GradientsParams::from_grads(g_loss.backward(), &self.encoder_decoder);
        self.encoder_decoder = self.optimizer_enc_dec.step(
            self.learning_rate,
            self.encoder_decoder.clone(),
            g_grads,
        );

        let metrics = BatchMetrics {
            joint_loss: joint_val,
            encoder_mse: enc_val,
            decoder_mse: dec_val,
            bitwise_error: bitwise_error_rate(decoded_messages.clone(), messages),
            adversarial_bce: adv_val,
            discriminator_cover_bce: d_cover_val,
            discriminator_encoded_bce: d_encoded_val,
        };

        Ok((
            metrics,
            BatchOutputs {
                encoded_images,
                noised_images,
                decoded_messages,
            },
        ))
    }

    /// Score one held-out batch without touching any state.
    ///
    /// Runs the same computations as [`Self::train_on_batch`] on
    /// evaluation copies of both sub-models on the inner backend: no
    /// gradient tape is built, batch-norm statistics are frozen, and
    /// neither optimizer is consulted.
    pub fn validate_on_batch(
        &self,
        images: Tensor<B, 4>,
        messages: Tensor<B, 2>,
    ) -> Result<(BatchMetrics, BatchOutputs<B::InnerBackend>), Error> {
        let batch_size = self.check_batch(&images, &messages)?;

        let encoder_decoder = self.encoder_decoder.valid();
        let discriminator = self.discriminator.valid();
        let images = images.inner();
        let messages = messages.inner();

        let d_target_cover: Tensor<B::InnerBackend, 2> =
            Tensor::full([batch_size, 1], self.cover_label, &self.device);
        let d_target_encoded: Tensor<B::InnerBackend, 2> =
            Tensor::full([batch_size, 1], self.encoded_label, &self.device);
        let g_target_encoded: Tensor<B::InnerBackend, 2> =
            Tensor::full([batch_size, 1], self.cover_label, &self.device);

        let d_on_cover = discriminator.forward(images.clone());
        let d_loss_cover = binary_cross_entropy_with_logits(d_on_cover, d_target_cover);

        let (encoded_images, noised_images, decoded_messages) =
            encoder_decoder.forward(images.clone(), messages.clone());

        let d_on_encoded = discriminator.forward(encoded_images.clone());
        let d_loss_encoded = binary_cross_entropy_with_logits(d_on_encoded, d_target_encoded);

        let d_on_encoded_for_gen = discriminator.forward(encoded_images.clone());
        let g_loss_adv = binary_cross_entropy_with_logits(d_on_encoded_for_gen, g_target_encoded);
        let g_loss_enc = mean_squared_error(encoded_images.clone(), images);
        let g_loss_dec = mean_squared_error(decoded_messages.clone(), messages.clone());
        let g_loss = g_loss_adv.clone().mul_scalar(self.adv_loss_weight)
            + g_loss_enc.clone().mul_scalar(self.enc_loss_weight)
            + g_loss_dec.clone().mul_scalar(self.dec_loss_weight);

        let metrics = BatchMetrics {
            joint_loss: g_loss.into_scalar().elem(),
            encoder_mse: g_loss_enc.into_scalar().elem(),
            decoder_mse: g_loss_dec.into_scalar().elem(),
            bitwise_error: bitwise_error_rate(decoded_messages.clone(), messages),
            adversarial_bce: g_loss_adv.into_scalar().elem(),
            discriminator_cover_bce: d_loss_cover.into_scalar().elem(),
            discriminator_encoded_bce: d_loss_encoded.into_scalar().elem(),
        };

        Ok((
            metrics,
            BatchOutputs {
                encoded_images,
                noised_images,
                decoded_messages,
            },
        ))
    }

    /// Save both sub-models and both optimizer states into `dir`.
    pub fn save_checkpoint(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        self.encoder_decoder
            .clone()
            .save_file(dir.join("encoder_decoder"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save encoder-decoder: {e}"))?;
        self.discriminator
            .clone()
            .save_file(dir.join("discriminator"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save discriminator: {e}"))?;
        recorder
            .record(
                self.optimizer_enc_dec.to_record(),
                dir.join("optimizer_enc_dec"),
            )
            .map_err(|e| anyhow::anyhow!("Failed to save encoder-decoder optimizer: {e}"))?;
        recorder
            .record(
                self.optimizer_discrim.to_record(),
                dir.join("optimizer_discrim"),
            )
            .map_err(|e| anyhow::anyhow!("Failed to save discriminator optimizer: {e}"))?;
        Ok(())
    }

    /// Restore both sub-models and both optimizer states from `dir`.
    ///
    /// The trainer must have been constructed with the same configuration
    /// that produced the checkpoint.
    pub fn load_checkpoint(mut self, dir: &Path) -> anyhow::Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        self.encoder_decoder = self
            .encoder_decoder
            .load_file(dir.join("encoder_decoder"), &recorder, &self.device)
            .map_err(|e| anyhow::anyhow!("Failed to load encoder-decoder from {dir:?}: {e}"))?;
        self.discriminator = self
            .discriminator
            .load_file(dir.join("discriminator"), &recorder, &self.device)
            .map_err(|e| anyhow::anyhow!("Failed to load discriminator from {dir:?}: {e}"))?;

        let record = recorder
            .load(dir.join("optimizer_enc_dec"), &self.device)
            .map_err(|e| anyhow::anyhow!("Failed to load encoder-decoder optimizer: {e}"))?;
        self.optimizer_enc_dec = self.optimizer_enc_dec.load_record(record);

        let record = recorder
            .load(dir.join("optimizer_discrim"), &self.device)
            .map_err(|e| anyhow::anyhow!("Failed to load discriminator optimizer: {e}"))?;
        self.optimizer_discrim = self.optimizer_discrim.load_record(record);

        Ok(self)
    }

    fn check_batch(&self, images: &Tensor<B, 4>, messages: &Tensor<B, 2>) -> Result<usize, Error> {
        let [image_batch, _, _, _] = images.dims();
        let [message_batch, message_length] = messages.dims();
        if message_batch != image_batch {
            return Err(Error::ShapeMismatch(format!(
                "images carry {image_batch} samples but messages carry {message_batch}"
            )));
        }
        if message_length != self.message_length {
            return Err(Error::ShapeMismatch(format!(
                "messages are {message_length} bits long, expected {}",
                self.message_length
            )));
        }
        Ok(image_batch)
    }
}

impl<B: AutodiffBackend> fmt::Display for WatermarkTrainer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encoder_decoder)
    }
}
