//! Step-loop driver around the per-batch trainer.
//!
//! Samples batches, accumulates a running average of the seven metrics,
//! logs at an interval, runs held-out validation batches, and saves
//! checkpoints (both sub-models, both optimizer states, JSON metadata).

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use serde::Deserialize;

use crate::config::DeviceSelector;
use crate::data::SyntheticSampler;
use crate::error::Error;
use crate::training::metrics::{BatchMetrics, RunningAvg};
use crate::training::trainer::WatermarkTrainer;

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct CheckpointMeta {
    pub step: usize,
}

/// Step-loop configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Total number of training steps.
    #[serde(default = "default_total_steps")]
    pub total_steps: usize,
    /// Batch size per step.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Steps between metric logging.
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    /// Steps between checkpoint saves.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    /// Directory for saving checkpoints.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
    /// Number of held-out batches averaged per validation pass.
    #[serde(default = "default_validation_batches")]
    pub validation_batches: usize,
}

fn default_total_steps() -> usize {
    5_000
}
fn default_batch_size() -> usize {
    16
}
fn default_log_interval() -> usize {
    100
}
fn default_checkpoint_interval() -> usize {
    1_000
}
fn default_checkpoint_dir() -> String {
    String::from("checkpoints/stegomark")
}
fn default_validation_batches() -> usize {
    4
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_steps: default_total_steps(),
            batch_size: default_batch_size(),
            log_interval: default_log_interval(),
            checkpoint_interval: default_checkpoint_interval(),
            checkpoint_dir: default_checkpoint_dir(),
            validation_batches: default_validation_batches(),
        }
    }
}

/// Resolve the configured device for the ndarray backend.
pub fn ndarray_device(selector: DeviceSelector) -> Result<burn::backend::ndarray::NdArrayDevice, Error> {
    match selector {
        DeviceSelector::Cpu => Ok(burn::backend::ndarray::NdArrayDevice::Cpu),
        DeviceSelector::Gpu => Err(Error::Device(
            "the ndarray backend exposes no GPU devices; select device = \"cpu\"".into(),
        )),
    }
}

/// Run the training loop.
///
/// `on_batch` is an optional telemetry hook invoked with each batch's
/// metrics; it is reporting-only and carries no gradient instrumentation.
///
/// # Returns
/// The path of the final checkpoint directory.
pub fn train<B: AutodiffBackend>(
    trainer: &mut WatermarkTrainer<B>,
    config: &RunConfig,
    sampler: &SyntheticSampler,
    val_sampler: Option<&SyntheticSampler>,
    device: &B::Device,
    mut on_batch: Option<&mut dyn FnMut(&BatchMetrics)>,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&config.checkpoint_dir)?;

    let train_start = Instant::now();
    let mut running_avg = RunningAvg::new();

    for step in 0..config.total_steps {
        let batch = sampler.sample_batch::<B>(config.batch_size, device);
        let (metrics, _outputs) = trainer.train_on_batch(batch.images, batch.messages)?;

        if !metrics.all_finite() {
            tracing::warn!(step, %metrics, "non-finite loss on this batch");
        }
        if let Some(hook) = on_batch.as_deref_mut() {
            hook(&metrics);
        }
        running_avg.update(&metrics);

        if config.log_interval > 0 && step % config.log_interval == 0 {
            let elapsed = train_start.elapsed().as_secs_f64();
            let remaining = if step > 0 {
                elapsed * (config.total_steps - step) as f64 / step as f64
            } else {
                0.0
            };
            let eta = if remaining < 60.0 {
                format!("{remaining:.0}s")
            } else if remaining < 3600.0 {
                format!("{:.0}m", remaining / 60.0)
            } else {
                format!("{:.1}h", remaining / 3600.0)
            };

            let val_str = match val_sampler {
                Some(val_s) => {
                    let mut val_avg = RunningAvg::new();
                    for _ in 0..config.validation_batches {
                        let batch = val_s.sample_batch::<B>(config.batch_size, device);
                        let (vm, _) = trainer.validate_on_batch(batch.images, batch.messages)?;
                        val_avg.update(&vm);
                    }
                    match val_avg.avg() {
                        Some(vm) => format!(
                            " | val({}): joint={:.4} dec_mse={:.4} bits={:.3}",
                            val_avg.count, vm.joint_loss, vm.decoder_mse, vm.bitwise_error
                        ),
                        None => String::new(),
                    }
                }
                None => String::new(),
            };

            match running_avg.avg() {
                Some(avg) => {
                    tracing::info!(step, eta, "avg({}) {}{}", running_avg.count, avg, val_str)
                }
                None => tracing::info!(step, eta, "no data{}", val_str),
            }
            running_avg.reset();
        }

        if config.checkpoint_interval > 0 && step > 0 && step % config.checkpoint_interval == 0 {
            let step_dir = Path::new(&config.checkpoint_dir).join(format!("step_{step}"));
            save_checkpoint(trainer, &step_dir, step)?;
            tracing::info!(step, "Checkpoint saved (models + optimizers + meta)");
        }
    }

    let final_dir = Path::new(&config.checkpoint_dir).join("final");
    save_checkpoint(trainer, &final_dir, config.total_steps)?;

    tracing::info!(
        total_steps = config.total_steps,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished; final checkpoint saved"
    );

    Ok(final_dir)
}

fn save_checkpoint<B: AutodiffBackend>(
    trainer: &WatermarkTrainer<B>,
    dir: &Path,
    step: usize,
) -> anyhow::Result<()> {
    trainer.save_checkpoint(dir)?;
    serde_json::to_writer(
        std::fs::File::create(dir.join("meta.json"))?,
        &CheckpointMeta { step },
    )?;
    Ok(())
}
