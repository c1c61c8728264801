//! Mask construction for blend-style noise layers.

use std::ops::Range;

use burn::prelude::*;
use burn::tensor::Distribution;
use rand::Rng;

/// Sample a random axis-aligned rectangle covering roughly `ratio` of the
/// image area. Side lengths scale with sqrt(ratio) and are clamped to at
/// least one pixel.
pub fn sample_rect(
    rng: &mut impl Rng,
    height: usize,
    width: usize,
    ratio: f64,
) -> (Range<usize>, Range<usize>) {
    let side = ratio.clamp(0.0, 1.0).sqrt();
    let rect_h = ((height as f64 * side).round() as usize).clamp(1, height);
    let rect_w = ((width as f64 * side).round() as usize).clamp(1, width);
    let top = rng.gen_range(0..=height - rect_h);
    let left = rng.gen_range(0..=width - rect_w);
    (top..top + rect_h, left..left + rect_w)
}

/// Single-channel mask of shape (N, 1, H, W) that is 1 inside the given
/// rectangle and 0 outside.
pub fn rect_mask<B: Backend>(
    dims: [usize; 4],
    rows: Range<usize>,
    cols: Range<usize>,
    device: &B::Device,
) -> Tensor<B, 4> {
    let [batch, _, height, width] = dims;
    let ones = Tensor::ones([batch, 1, rows.len(), cols.len()], device);
    Tensor::zeros([batch, 1, height, width], device)
        .slice_assign([0..batch, 0..1, rows, cols], ones)
}

/// Single-channel Bernoulli mask of shape (N, 1, H, W); each pixel is 1
/// with probability `keep`. The same mask applies to all image channels.
pub fn bernoulli_mask<B: Backend>(dims: [usize; 4], keep: f64, device: &B::Device) -> Tensor<B, 4> {
    let [batch, _, height, width] = dims;
    Tensor::random(
        [batch, 1, height, width],
        Distribution::Bernoulli(keep.clamp(0.0, 1.0)),
        device,
    )
}
