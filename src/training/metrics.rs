//! Named per-batch metrics and their running average.

use std::fmt;

/// The seven reported metrics, in their defined reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossName {
    /// Weighted joint generator objective.
    JointLoss,
    /// MSE between encoded and cover images.
    EncoderMse,
    /// MSE between decoded and true messages.
    DecoderMse,
    /// Fraction of message bits recovered incorrectly.
    BitwiseError,
    /// BCE pushing the discriminator to call encoded images covers.
    AdversarialBce,
    /// Discriminator BCE on cover images.
    DiscriminatorCoverBce,
    /// Discriminator BCE on encoded images.
    DiscriminatorEncodedBce,
}

impl LossName {
    /// All metric names in reporting order.
    pub const ALL: [LossName; 7] = [
        LossName::JointLoss,
        LossName::EncoderMse,
        LossName::DecoderMse,
        LossName::BitwiseError,
        LossName::AdversarialBce,
        LossName::DiscriminatorCoverBce,
        LossName::DiscriminatorEncodedBce,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LossName::JointLoss => "joint_loss",
            LossName::EncoderMse => "encoder_mse",
            LossName::DecoderMse => "decoder_mse",
            LossName::BitwiseError => "bitwise_error",
            LossName::AdversarialBce => "adversarial_bce",
            LossName::DiscriminatorCoverBce => "discriminator_cover_bce",
            LossName::DiscriminatorEncodedBce => "discriminator_encoded_bce",
        }
    }
}

impl fmt::Display for LossName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar metrics for one processed batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchMetrics {
    pub joint_loss: f64,
    pub encoder_mse: f64,
    pub decoder_mse: f64,
    pub bitwise_error: f64,
    pub adversarial_bce: f64,
    pub discriminator_cover_bce: f64,
    pub discriminator_encoded_bce: f64,
}

impl BatchMetrics {
    pub fn get(&self, name: LossName) -> f64 {
        match name {
            LossName::JointLoss => self.joint_loss,
            LossName::EncoderMse => self.encoder_mse,
            LossName::DecoderMse => self.decoder_mse,
            LossName::BitwiseError => self.bitwise_error,
            LossName::AdversarialBce => self.adversarial_bce,
            LossName::DiscriminatorCoverBce => self.discriminator_cover_bce,
            LossName::DiscriminatorEncodedBce => self.discriminator_encoded_bce,
        }
    }

    /// `(name, value)` pairs in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (LossName, f64)> + '_ {
        LossName::ALL.iter().map(move |&name| (name, self.get(name)))
    }

    pub fn all_finite(&self) -> bool {
        self.iter().all(|(_, value)| value.is_finite())
    }
}

impl fmt::Display for BatchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "joint={:.4} enc_mse={:.4} dec_mse={:.4} bits={:.3} adv={:.4} d_cov={:.4} d_enc={:.4}",
            self.joint_loss,
            self.encoder_mse,
            self.decoder_mse,
            self.bitwise_error,
            self.adversarial_bce,
            self.discriminator_cover_bce,
            self.discriminator_encoded_bce,
        )
    }
}

/// Running average accumulator over a logging interval.
#[derive(Debug)]
pub struct RunningAvg {
    sums: [f64; 7],
    pub count: usize,
}

impl RunningAvg {
    pub fn new() -> Self {
        Self {
            sums: [0.0; 7],
            count: 0,
        }
    }

    pub fn update(&mut self, metrics: &BatchMetrics) {
        for (slot, (_, value)) in self.sums.iter_mut().zip(metrics.iter()) {
            *slot += value;
        }
        self.count += 1;
    }

    pub fn avg(&self) -> Option<BatchMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(BatchMetrics {
            joint_loss: self.sums[0] / n,
            encoder_mse: self.sums[1] / n,
            decoder_mse: self.sums[2] / n,
            bitwise_error: self.sums[3] / n,
            adversarial_bce: self.sums[4] / n,
            discriminator_cover_bce: self.sums[5] / n,
            discriminator_encoded_bce: self.sums[6] / n,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for RunningAvg {
    fn default() -> Self {
        Self::new()
    }
}
