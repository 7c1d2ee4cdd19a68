//! Invertor configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::generator::GeneratorConfig;

/// Everything an [`crate::Invertor`](crate::invertor::Invertor) needs at
/// construction: the generator variant, both phase budgets, learning-rate
/// schedule parameters, loss-term weights and output locations. No
/// process-wide defaults exist beyond this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvertorConfig {
    /// Generator variant and geometry.
    pub generator: GeneratorConfig,

    /// Latent-phase step budget.
    pub w_epochs: usize,
    /// Joint-phase step budget.
    pub n_epochs: usize,

    /// Latent-phase peak learning rate.
    pub w_lr: f32,
    /// Joint-phase peak learning rate.
    pub n_lr: f32,
    /// Floor both cosine decays settle at.
    pub lr_min: f32,
    /// Fraction of each phase spent on linear warm-up.
    pub warmup_fraction: f32,

    /// Pixel-MSE weight in the reconstruction loss.
    pub pixel_weight: f32,
    /// Multi-scale term weight in the reconstruction loss.
    pub perceptual_weight: f32,
    /// Pyramid depth of the multi-scale term.
    pub perceptual_levels: usize,
    /// Base weight of the noise autocorrelation penalty.
    pub noise_reg_weight: f32,
    /// Geometric per-layer decay of the penalty weight.
    pub noise_reg_decay: f32,

    /// Random seeds averaged for the starting latent.
    pub mean_latent_samples: usize,
    /// Seed for every stochastic choice inside one embed call.
    pub seed: u64,

    /// Directory embeddings are saved to / loaded from.
    pub latents_dir: PathBuf,
    /// Directory diagnostic images are written to.
    pub results_dir: PathBuf,

    /// Print per-step progress.
    pub verbose: bool,
    /// Steps between progress lines.
    pub log_interval: usize,
}

impl Default for InvertorConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            w_epochs: 800,
            n_epochs: 500,
            w_lr: 0.01,
            n_lr: 0.01,
            lr_min: 0.0,
            warmup_fraction: 0.05,
            pixel_weight: 1.0,
            perceptual_weight: 1.0,
            perceptual_levels: 3,
            noise_reg_weight: 1e4,
            noise_reg_decay: 0.5,
            mean_latent_samples: 256,
            seed: 42,
            latents_dir: PathBuf::from("invertor_results/latents"),
            results_dir: PathBuf::from("invertor_results"),
            verbose: false,
            log_interval: 50,
        }
    }
}

impl InvertorConfig {
    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Serialization(format!("config decode failed: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("config encode failed: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject inconsistent settings before anything is built.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.warmup_fraction) {
            return Err(Error::Configuration(format!(
                "warmup fraction {} outside [0, 1)",
                self.warmup_fraction
            )));
        }
        if self.w_lr <= 0.0 || self.n_lr <= 0.0 {
            return Err(Error::Configuration(
                "learning rates must be positive".to_string(),
            ));
        }
        if self.lr_min < 0.0 || self.lr_min > self.w_lr || self.lr_min > self.n_lr {
            return Err(Error::Configuration(format!(
                "lr_min {} outside [0, min(w_lr, n_lr)]",
                self.lr_min
            )));
        }
        if self.noise_reg_decay <= 0.0 || self.noise_reg_decay > 1.0 {
            return Err(Error::Configuration(format!(
                "noise regularization decay {} outside (0, 1]",
                self.noise_reg_decay
            )));
        }
        if self.mean_latent_samples == 0 {
            return Err(Error::Configuration(
                "mean latent needs at least one sample".to_string(),
            ));
        }
        Ok(())
    }
}
