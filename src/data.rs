//! Batch types and synthetic data for the training loop and tests.
//!
//! Real cover images come from an external data-loading pipeline; this
//! module provides the batch pair the trainer consumes plus a synthetic
//! sampler that stands in for that pipeline.

use burn::prelude::*;
use burn::tensor::Distribution;

/// One training batch: cover images and the messages to embed in them.
#[derive(Debug, Clone)]
pub struct WatermarkBatch<B: Backend> {
    /// Cover images, shape `(batch, 3, H, W)`.
    pub images: Tensor<B, 4>,
    /// Binary messages, shape `(batch, L)` with values in {0, 1}.
    pub messages: Tensor<B, 2>,
}

impl<B: Backend> WatermarkBatch<B> {
    pub fn new(images: Tensor<B, 4>, messages: Tensor<B, 2>) -> Self {
        Self { images, messages }
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Produces random covers and Bernoulli(0.5) messages.
#[derive(Debug, Clone)]
pub struct SyntheticSampler {
    pub height: usize,
    pub width: usize,
    pub message_length: usize,
}

impl SyntheticSampler {
    pub fn new(height: usize, width: usize, message_length: usize) -> Self {
        Self {
            height,
            width,
            message_length,
        }
    }

    pub fn sample_batch<B: Backend>(&self, batch_size: usize, device: &B::Device) -> WatermarkBatch<B> {
        let images = Tensor::random(
            [batch_size, 3, self.height, self.width],
            Distribution::Normal(0.0, 1.0),
            device,
        );
        let messages = Tensor::random(
            [batch_size, self.message_length],
            Distribution::Bernoulli(0.5),
            device,
        );
        WatermarkBatch::new(images, messages)
    }
}
