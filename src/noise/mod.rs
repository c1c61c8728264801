//! Noise pipeline applied between the encoder and the decoder.
//!
//! The pipeline is configured as a list of layer descriptions; one layer
//! is drawn uniformly at random on every forward pass, so the decoder
//! learns to survive each distortion rather than their composition. An
//! empty list means the encoded image passes through unchanged.
//!
//! All layers are differentiable with respect to their image inputs:
//! blends are mask multiplications and crops are slices, so gradients
//! flow back into the encoder through the surviving pixels.

pub mod mask;

use burn::prelude::*;
use burn::tensor::Distribution;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::noise::mask::{bernoulli_mask, rect_mask, sample_rect};

/// A single distortion applied to the encoded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NoiseKind {
    /// Pass the encoded image through unchanged.
    Identity,
    /// Per-pixel Bernoulli blend: each pixel keeps the encoded value with
    /// probability `keep`, otherwise reverts to the cover value.
    Dropout {
        #[serde(default = "default_keep")]
        keep: f64,
    },
    /// A random rectangle covering `ratio` of the area keeps encoded
    /// pixels; everything outside reverts to the cover image.
    Cropout {
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
    /// Cuts a random rectangle covering `ratio` of the area out of the
    /// encoded image. The output is smaller than the input.
    Crop {
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
    /// Additive Gaussian noise with standard deviation `std`.
    Gaussian {
        #[serde(default = "default_std")]
        std: f64,
    },
}

fn default_keep() -> f64 {
    0.7
}
fn default_ratio() -> f64 {
    0.55
}
fn default_std() -> f64 {
    0.05
}

/// Ordered list of noise layers to draw from, as it appears in the
/// training configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoiseConfig {
    pub layers: Vec<NoiseKind>,
}

impl NoiseConfig {
    /// Identity-only pipeline (no distortion).
    pub fn identity() -> Self {
        Self { layers: Vec::new() }
    }
}

/// Applies one randomly drawn noise layer per forward pass.
#[derive(Debug, Clone)]
pub struct Noiser {
    layers: Vec<NoiseKind>,
}

impl Noiser {
    pub fn new(config: &NoiseConfig) -> Self {
        Self {
            layers: config.layers.clone(),
        }
    }

    /// Distort `encoded`, blending against `cover` where a layer calls
    /// for it. With no configured layers the encoded image is returned
    /// unchanged.
    pub fn apply<B: Backend>(&self, cover: &Tensor<B, 4>, encoded: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut rng = rand::thread_rng();
        match self.layers.choose(&mut rng) {
            None => encoded,
            Some(kind) => kind.apply(cover, encoded, &mut rng),
        }
    }
}

impl NoiseKind {
    fn apply<B: Backend>(
        &self,
        cover: &Tensor<B, 4>,
        encoded: Tensor<B, 4>,
        rng: &mut impl Rng,
    ) -> Tensor<B, 4> {
        match *self {
            NoiseKind::Identity => encoded,
            NoiseKind::Dropout { keep } => {
                let mask = bernoulli_mask(encoded.dims(), keep, &encoded.device());
                blend(cover, encoded, mask)
            }
            NoiseKind::Cropout { ratio } => {
                let [_, _, height, width] = encoded.dims();
                let (rows, cols) = sample_rect(rng, height, width, ratio);
                let mask = rect_mask(encoded.dims(), rows, cols, &encoded.device());
                blend(cover, encoded, mask)
            }
            NoiseKind::Crop { ratio } => {
                let [batch, channels, height, width] = encoded.dims();
                let (rows, cols) = sample_rect(rng, height, width, ratio);
                encoded.slice([0..batch, 0..channels, rows, cols])
            }
            NoiseKind::Gaussian { std } => {
                let noise = Tensor::random(
                    encoded.dims(),
                    Distribution::Normal(0.0, std),
                    &encoded.device(),
                );
                encoded + noise
            }
        }
    }
}

/// mask * encoded + (1 - mask) * cover, broadcasting the single-channel
/// mask over the image channels.
fn blend<B: Backend>(
    cover: &Tensor<B, 4>,
    encoded: Tensor<B, 4>,
    mask: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let inverse = mask.ones_like() - mask.clone();
    encoded * mask + cover.clone() * inverse
}
