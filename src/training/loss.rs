//! Loss primitives for adversarial watermark training.
//!
//! All functions are generic over `B: Backend` and operate on burn
//! tensors; scalar losses come back as shape `(1,)` tensors so they stay
//! on the autodiff graph until the caller extracts or backpropagates.

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;

/// Numerically stable binary cross entropy on pre-activation logits.
///
/// Computes `mean(max(x, 0) - x*z + ln(1 + exp(-|x|)))` for logits `x`
/// and targets `z`, the standard stable form of `BCE(sigmoid(x), z)`.
/// Non-negative for targets in [0, 1].
///
/// Shapes: `(batch, 1)` logits and targets. Returns `(1,)`.
pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let hinge = logits.clone().clamp_min(0.0);
    let linear = logits.clone() * targets;
    let softplus = logits.abs().neg().exp().add_scalar(1.0).log();
    (hinge - linear + softplus).mean()
}

/// Mean squared error, averaged over every element.
pub fn mean_squared_error<B: Backend, const D: usize>(
    prediction: Tensor<B, D>,
    target: Tensor<B, D>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(prediction, target, Reduction::Mean)
}

/// Fraction of message bits recovered incorrectly.
///
/// Decoded values are clamped to [0, 1] and rounded to the nearest bit
/// before comparison; the result lies in [0, 1] and carries no gradient.
pub fn bitwise_error_rate<B: Backend>(decoded: Tensor<B, 2>, messages: Tensor<B, 2>) -> f64 {
    let [batch, length] = decoded.dims();
    let rounded = decoded.detach().clamp(0.0, 1.0).round();
    let mismatches: f64 = (rounded - messages.detach())
        .abs()
        .sum()
        .into_scalar()
        .elem();
    mismatches / (batch * length) as f64
}
