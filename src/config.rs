//! Training configuration loaded from TOML.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::decoder::DecoderBlockKind;
use crate::model::encoder::NetworkVariant;
use crate::noise::NoiseConfig;

/// Compute device requested for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelector {
    Cpu,
    Gpu,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self::Cpu
    }
}

/// Trainer configuration.
///
/// `adv_loss_weight` and `enc_loss_weight` carry no defaults and must be
/// present in the TOML source; `dec_loss_weight` falls back to 1.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainerConfig {
    /// Compute device the models and tensors are bound to.
    #[serde(default)]
    pub device: DeviceSelector,

    /// Noise layers drawn from between encoder and decoder.
    #[serde(default)]
    pub noise: NoiseConfig,

    /// Encoder output composition variant.
    #[serde(default)]
    pub network: NetworkVariant,

    /// Length of the embedded binary message.
    #[serde(default = "default_message_length")]
    pub message_length: usize,

    /// Encoder feature block count.
    #[serde(default = "default_encoder_blocks")]
    pub encoder_blocks: usize,

    /// Encoder channel width.
    #[serde(default = "default_channels")]
    pub encoder_channels: usize,

    /// Decoder block count.
    #[serde(default = "default_decoder_blocks")]
    pub decoder_blocks: usize,

    /// Decoder channel width.
    #[serde(default = "default_channels")]
    pub decoder_channels: usize,

    /// Decoder block style.
    #[serde(default)]
    pub decoder_block_type: DecoderBlockKind,

    /// Discriminator block count.
    #[serde(default = "default_discriminator_blocks")]
    pub discriminator_blocks: usize,

    /// Discriminator channel width.
    #[serde(default = "default_channels")]
    pub discriminator_channels: usize,

    /// Weight of the adversarial loss in the joint generator objective.
    pub adv_loss_weight: f64,

    /// Weight of the encoder image-fidelity loss.
    pub enc_loss_weight: f64,

    /// Weight of the decoder message-fidelity loss.
    #[serde(default = "default_dec_loss_weight")]
    pub dec_loss_weight: f64,

    /// Learning rate passed to both Adam optimizers on every step.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_message_length() -> usize {
    30
}
fn default_encoder_blocks() -> usize {
    4
}
fn default_decoder_blocks() -> usize {
    7
}
fn default_discriminator_blocks() -> usize {
    3
}
fn default_channels() -> usize {
    64
}
fn default_dec_loss_weight() -> f64 {
    1.0
}
fn default_learning_rate() -> f64 {
    1e-3
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            device: DeviceSelector::default(),
            noise: NoiseConfig::default(),
            network: NetworkVariant::default(),
            message_length: default_message_length(),
            encoder_blocks: default_encoder_blocks(),
            encoder_channels: default_channels(),
            decoder_blocks: default_decoder_blocks(),
            decoder_channels: default_channels(),
            decoder_block_type: DecoderBlockKind::default(),
            discriminator_blocks: default_discriminator_blocks(),
            discriminator_channels: default_channels(),
            adv_loss_weight: 1e-3,
            enc_loss_weight: 0.7,
            dec_loss_weight: default_dec_loss_weight(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl TrainerConfig {
    /// Parse and validate a configuration from TOML source.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject degenerate values that would make construction nonsensical.
    pub fn validate(&self) -> Result<(), Error> {
        if self.message_length == 0 {
            return Err(Error::Configuration("message_length must be positive".into()));
        }
        if self.encoder_blocks == 0 || self.decoder_blocks == 0 || self.discriminator_blocks == 0 {
            return Err(Error::Configuration("block counts must be positive".into()));
        }
        if self.encoder_channels == 0 || self.decoder_channels == 0 || self.discriminator_channels == 0
        {
            return Err(Error::Configuration("channel widths must be positive".into()));
        }
        for (name, weight) in [
            ("adv_loss_weight", self.adv_loss_weight),
            ("enc_loss_weight", self.enc_loss_weight),
            ("dec_loss_weight", self.dec_loss_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Configuration(format!(
                    "{name} must be finite and non-negative, got {weight}"
                )));
            }
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::Configuration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::NoiseKind;

    #[test]
    fn test_default_values() {
        let cfg = TrainerConfig::default();
        assert_eq!(cfg.device, DeviceSelector::Cpu);
        assert_eq!(cfg.message_length, 30);
        assert_eq!(cfg.encoder_blocks, 4);
        assert_eq!(cfg.decoder_blocks, 7);
        assert_eq!(cfg.discriminator_blocks, 3);
        assert_eq!(cfg.encoder_channels, 64);
        assert!((cfg.dec_loss_weight - 1.0).abs() < 1e-12);
        assert!((cfg.learning_rate - 1e-3).abs() < 1e-12);
        assert!(cfg.noise.layers.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
            adv_loss_weight = 0.001
            enc_loss_weight = 0.7
            message_length = 52
            network = "residual"
        "#;
        let cfg = TrainerConfig::from_toml(toml_str).unwrap();
        assert_eq!(cfg.message_length, 52);
        assert_eq!(cfg.network, NetworkVariant::Residual);
        // Defaults for unspecified fields
        assert_eq!(cfg.decoder_blocks, 7);
        assert!((cfg.dec_loss_weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_required_weight_is_rejected() {
        let toml_str = r#"
            enc_loss_weight = 0.7
        "#;
        let err = TrainerConfig::from_toml(toml_str).unwrap_err();
        assert!(
            matches!(err, Error::Configuration(ref msg) if msg.contains("adv_loss_weight")),
            "expected a configuration error naming adv_loss_weight, got: {err}"
        );
    }

    #[test]
    fn test_noise_layers_parse() {
        let toml_str = r#"
            adv_loss_weight = 0.001
            enc_loss_weight = 0.7

            [[noise]]
            type = "cropout"
            ratio = 0.4

            [[noise]]
            type = "gaussian"
        "#;
        let cfg = TrainerConfig::from_toml(toml_str).unwrap();
        assert_eq!(cfg.noise.layers.len(), 2);
        assert_eq!(cfg.noise.layers[0], NoiseKind::Cropout { ratio: 0.4 });
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let mut cfg = TrainerConfig::default();
        cfg.message_length = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrainerConfig::default();
        cfg.adv_loss_weight = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = TrainerConfig::default();
        cfg.enc_loss_weight = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrainerConfig::default();
        cfg.learning_rate = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_device_selector_parses() {
        let toml_str = r#"
            device = "gpu"
            adv_loss_weight = 0.001
            enc_loss_weight = 0.7
        "#;
        let cfg = TrainerConfig::from_toml(toml_str).unwrap();
        assert_eq!(cfg.device, DeviceSelector::Gpu);
    }
}
