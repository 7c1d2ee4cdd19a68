//! The two-phase inversion engine.
//!
//! [`Invertor::embed`] recovers a `(latent, noise)` pair for a batch of
//! target images by gradient descent through a frozen generator: a latent
//! phase that optimizes only the latent code against frozen noise, then a
//! joint phase that optimizes latent and noise together under a noise
//! autocorrelation penalty, renormalizing the maps after every step.

mod config;
mod run_state;

pub use config::InvertorConfig;
pub use run_state::RunState;

use std::fmt;

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::autograd::{backward, ops, Tensor};
use crate::error::{Error, Result};
use crate::generator::{Generator, GeneratorRegistry};
use crate::latent::{random_noise, Embedding, LatentCode, NoiseList};
use crate::loss::{noise_regularization, ReconstructionLoss};
use crate::optim::{Adam, LRScheduler, Optimizer, WarmupCosineDecayLR};

/// Which optimization phase a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Latent-only descent against frozen noise.
    Latent,
    /// Joint descent over latent and noise maps.
    Joint,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Latent => write!(f, "latent phase"),
            Phase::Joint => write!(f, "joint phase"),
        }
    }
}

/// Per-call overrides for [`Invertor::embed`]. `None` fields fall back to
/// the config.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Write a target/reconstruction comparison image per example.
    pub save_images: bool,
    /// Override the latent-phase step budget.
    pub w_epochs: Option<usize>,
    /// Override the joint-phase step budget.
    pub n_epochs: Option<usize>,
    /// Override progress printing.
    pub verbose: Option<bool>,
}

/// What one embed call actually did: step counts per phase and the full
/// loss trajectory, one entry per step in execution order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub latent_steps: usize,
    pub joint_steps: usize,
    pub loss_history: Vec<f32>,
}

impl RunReport {
    pub fn total_steps(&self) -> usize {
        self.latent_steps + self.joint_steps
    }
}

/// The inversion engine: a frozen generator plus the optimization recipe.
pub struct Invertor {
    generator: Box<dyn Generator>,
    cfg: InvertorConfig,
    loss: ReconstructionLoss,
    working_noise: Option<NoiseList>,
    last_report: Option<RunReport>,
    rng: StdRng,
}

impl Invertor {
    /// Build an invertor with the built-in generator variants.
    pub fn new(cfg: InvertorConfig) -> Result<Self> {
        Self::with_registry(cfg, &GeneratorRegistry::with_builtins())
    }

    /// Build an invertor resolving the generator through a caller-supplied
    /// registry.
    pub fn with_registry(cfg: InvertorConfig, registry: &GeneratorRegistry) -> Result<Self> {
        cfg.validate()?;
        let generator = registry.build(&cfg.generator)?;
        let loss = ReconstructionLoss::new(
            cfg.pixel_weight,
            cfg.perceptual_weight,
            cfg.perceptual_levels,
        );
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(Self {
            generator,
            cfg,
            loss,
            working_noise: None,
            last_report: None,
            rng,
        })
    }

    pub fn config(&self) -> &InvertorConfig {
        &self.cfg
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Report from the most recent embed call.
    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Recover an embedding for `images` (`[batch, 3, r, r]`, values in
    /// `[0, 1]`). `names` labels each example and must match the batch.
    ///
    /// Every stochastic choice is driven by a generator seeded from
    /// `cfg.seed` at the top of the call, so identical inputs produce
    /// bit-identical embeddings.
    pub fn embed(
        &mut self,
        images: &ArrayD<f32>,
        names: &[String],
        opts: &EmbedOptions,
    ) -> Result<Embedding> {
        let batch = self.check_targets(images, names)?;
        let w_epochs = opts.w_epochs.unwrap_or(self.cfg.w_epochs);
        let n_epochs = opts.n_epochs.unwrap_or(self.cfg.n_epochs);
        let verbose = opts.verbose.unwrap_or(self.cfg.verbose);

        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let mut state = self.init_state(batch, &mut rng);
        let target = Tensor::new(images.clone(), false);

        self.run_latent_phase(&mut state, &target, w_epochs, verbose)?;
        state.promote_noise();
        self.run_joint_phase(&mut state, &target, n_epochs, verbose)?;

        let report = RunReport {
            latent_steps: state.latent_steps(),
            joint_steps: state.joint_steps(),
            loss_history: state.take_history(),
        };
        if verbose {
            println!(
                "done: {} latent + {} joint steps, final loss = {:.6}",
                report.latent_steps,
                report.joint_steps,
                report.loss_history.last().copied().unwrap_or(f32::NAN)
            );
        }
        self.last_report = Some(report);

        let embedding = state.into_embedding()?;
        self.working_noise = Some(embedding.noise().clone());

        if opts.save_images {
            self.save_comparisons(images, names, &embedding)?;
        }
        Ok(embedding)
    }

    /// Forward-only synthesis from a latent plus an explicit or working
    /// noise list.
    pub fn generate(&self, latent: &LatentCode, noise: Option<&NoiseList>) -> Result<ArrayD<f32>> {
        let noise = match noise {
            Some(n) => n,
            None => self.working_noise.as_ref().ok_or_else(|| {
                Error::Configuration(
                    "no working noise; run embed, update_noise or reset_noise first".to_string(),
                )
            })?,
        };
        noise.validate_against(self.generator.as_ref())?;
        if latent.batch() != noise.batch() {
            return Err(Error::Configuration(format!(
                "latent batch {} does not match noise batch {}",
                latent.batch(),
                noise.batch()
            )));
        }
        let latent_t = latent.to_tensor(false);
        let noise_t: Vec<Tensor> = noise.to_tensors(false);
        Ok(self.generator.synthesize(&latent_t, &noise_t)?.data())
    }

    /// Replace the working noise list with a validated external one.
    pub fn update_noise(&mut self, noise: NoiseList) -> Result<()> {
        noise.validate_against(self.generator.as_ref())?;
        self.working_noise = Some(noise);
        Ok(())
    }

    /// Replace the working noise list with fresh standard-normal maps.
    pub fn reset_noise(&mut self, batch: usize) -> Result<()> {
        let noise = random_noise(self.generator.as_ref(), batch, &mut self.rng)?;
        self.working_noise = Some(noise);
        Ok(())
    }

    pub fn working_noise(&self) -> Option<&NoiseList> {
        self.working_noise.as_ref()
    }

    fn check_targets(&self, images: &ArrayD<f32>, names: &[String]) -> Result<usize> {
        let r = self.generator.resolution();
        let shape = images.shape();
        if shape.len() != 4 || shape[1] != 3 || shape[2] != r || shape[3] != r {
            return Err(Error::Configuration(format!(
                "target images must be [batch, 3, {r}, {r}], got {shape:?}"
            )));
        }
        if names.len() != shape[0] {
            return Err(Error::Configuration(format!(
                "{} names for a batch of {}",
                names.len(),
                shape[0]
            )));
        }
        Ok(shape[0])
    }

    /// Starting point of a run: every example begins at the mean latent,
    /// and every example shares the same initial noise sample so identical
    /// targets follow identical trajectories.
    fn init_state(&self, batch: usize, rng: &mut StdRng) -> RunState {
        let layers = self.generator.num_layers();
        let dim = self.generator.latent_dim();

        let mean = self.generator.mean_latent(self.cfg.mean_latent_samples, rng);
        let latent_data =
            ArrayD::from_shape_fn(IxDyn(&[batch, layers, dim]), |idx| mean[idx[2]]);
        let latent = Tensor::new(latent_data, true);

        let unit = Normal::new(0.0f32, 1.0).expect("valid normal");
        let noise = self
            .generator
            .layer_noise_shapes()
            .iter()
            .map(|s| {
                let single = ArrayD::from_shape_fn(IxDyn(&[1, 1, s.height, s.width]), |_| {
                    unit.sample(rng)
                });
                let replicated = ArrayD::from_shape_fn(
                    IxDyn(&[batch, 1, s.height, s.width]),
                    |idx| single[[0, 0, idx[2], idx[3]]],
                );
                Tensor::new(replicated, false)
            })
            .collect();

        RunState::new(latent, noise)
    }

    fn run_latent_phase(
        &self,
        state: &mut RunState,
        target: &Tensor,
        steps: usize,
        verbose: bool,
    ) -> Result<()> {
        let mut optimizer = Adam::default_params(self.cfg.w_lr);
        let mut schedule = WarmupCosineDecayLR::with_warmup_fraction(
            self.cfg.w_lr,
            self.cfg.lr_min,
            self.cfg.warmup_fraction,
            steps,
        );
        let started = std::time::Instant::now();

        for step in 0..steps {
            schedule.apply(&mut optimizer);
            let image = self.generator.synthesize(state.latent(), state.noise())?;
            let loss = self.loss.forward(&image, target);
            let value = loss.item();
            if !value.is_finite() {
                return Err(Error::NumericDivergence {
                    phase: Phase::Latent,
                    step,
                });
            }

            backward(&loss);
            let mut params = state.latent_params();
            optimizer.step(&mut params);
            optimizer.zero_grad(&mut params);
            schedule.step();

            state.record_loss(value);
            state.count_latent_step();
            if verbose && (step % self.cfg.log_interval == 0 || step + 1 == steps) {
                println!(
                    "latent step {step}/{steps}: loss = {value:.6}, lr = {:.6}",
                    optimizer.lr()
                );
            }
        }
        if verbose {
            println!("latent phase: {steps} steps in {:.1}s", started.elapsed().as_secs_f32());
        }
        Ok(())
    }

    fn run_joint_phase(
        &self,
        state: &mut RunState,
        target: &Tensor,
        steps: usize,
        verbose: bool,
    ) -> Result<()> {
        let mut optimizer = Adam::default_params(self.cfg.n_lr);
        let mut schedule = WarmupCosineDecayLR::with_warmup_fraction(
            self.cfg.n_lr,
            self.cfg.lr_min,
            self.cfg.warmup_fraction,
            steps,
        );
        let started = std::time::Instant::now();

        for step in 0..steps {
            schedule.apply(&mut optimizer);
            let image = self.generator.synthesize(state.latent(), state.noise())?;
            let reconstruction = self.loss.forward(&image, target);
            let penalty = noise_regularization(
                state.noise(),
                self.cfg.noise_reg_weight,
                self.cfg.noise_reg_decay,
            );
            let loss = ops::add(&reconstruction, &penalty);
            let value = loss.item();
            if !value.is_finite() {
                return Err(Error::NumericDivergence {
                    phase: Phase::Joint,
                    step,
                });
            }

            backward(&loss);
            let mut params = state.joint_params();
            optimizer.step(&mut params);
            optimizer.zero_grad(&mut params);
            schedule.step();

            // Keep the maps in the unit-normal regime the generator was
            // built for. Positional Adam moments survive the tensor swap.
            state.renormalize_noise();

            state.record_loss(value);
            state.count_joint_step();
            if verbose && (step % self.cfg.log_interval == 0 || step + 1 == steps) {
                println!(
                    "joint step {step}/{steps}: loss = {value:.6}, lr = {:.6}",
                    optimizer.lr()
                );
            }
        }
        if verbose {
            println!("joint phase: {steps} steps in {:.1}s", started.elapsed().as_secs_f32());
        }
        Ok(())
    }

    fn save_comparisons(
        &self,
        targets: &ArrayD<f32>,
        names: &[String],
        embedding: &Embedding,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.cfg.results_dir)?;
        let reconstructed = self.generate(embedding.latent(), Some(embedding.noise()))?;
        for (index, name) in names.iter().enumerate() {
            let target = targets.index_axis(ndarray::Axis(0), index).to_owned();
            let recon = reconstructed.index_axis(ndarray::Axis(0), index).to_owned();
            let path = self.cfg.results_dir.join(format!("{name}_comparison.png"));
            crate::io::save_comparison(&target, &recon, &path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorConfig;

    fn tiny_config() -> InvertorConfig {
        InvertorConfig {
            generator: GeneratorConfig {
                resolution: 8,
                base_resolution: 4,
                latent_dim: 4,
                channels: 3,
                ..GeneratorConfig::default()
            },
            w_epochs: 4,
            n_epochs: 3,
            mean_latent_samples: 8,
            noise_reg_weight: 10.0,
            ..InvertorConfig::default()
        }
    }

    fn target_for(invertor: &Invertor) -> ArrayD<f32> {
        let r = invertor.generator().resolution();
        ArrayD::from_shape_fn(IxDyn(&[1, 3, r, r]), |idx| {
            0.1 + 0.05 * (idx[1] as f32) + 0.01 * (idx[2] as f32)
        })
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Latent.to_string(), "latent phase");
        assert_eq!(Phase::Joint.to_string(), "joint phase");
    }

    #[test]
    fn test_embed_reports_all_steps() {
        let mut invertor = Invertor::new(tiny_config()).expect("invertor");
        let target = target_for(&invertor);
        invertor
            .embed(&target, &["a".to_string()], &EmbedOptions::default())
            .expect("embed");

        let report = invertor.last_report().expect("report");
        assert_eq!(report.latent_steps, 4);
        assert_eq!(report.joint_steps, 3);
        assert_eq!(report.loss_history.len(), report.total_steps());
    }

    #[test]
    fn test_embed_rejects_wrong_resolution() {
        let mut invertor = Invertor::new(tiny_config()).expect("invertor");
        let wrong = ArrayD::zeros(IxDyn(&[1, 3, 16, 16]));
        let err = invertor.embed(&wrong, &["a".to_string()], &EmbedOptions::default());
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_embed_rejects_name_count_mismatch() {
        let mut invertor = Invertor::new(tiny_config()).expect("invertor");
        let target = target_for(&invertor);
        let err = invertor.embed(&target, &[], &EmbedOptions::default());
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_embed_shapes_match_generator() {
        let mut invertor = Invertor::new(tiny_config()).expect("invertor");
        let target = target_for(&invertor);
        let embedding = invertor
            .embed(&target, &["a".to_string()], &EmbedOptions::default())
            .expect("embed");

        let g = invertor.generator();
        assert_eq!(embedding.latent().num_layers(), g.num_layers());
        assert_eq!(embedding.latent().dim(), g.latent_dim());
        assert_eq!(embedding.noise().len(), g.num_layers());
        embedding
            .noise()
            .validate_against(g)
            .expect("noise matches generator");
    }

    #[test]
    fn test_generate_without_noise_source_fails() {
        let invertor = Invertor::new(tiny_config()).expect("invertor");
        let g = invertor.generator();
        let latent = LatentCode::new(ArrayD::zeros(IxDyn(&[
            1,
            g.num_layers(),
            g.latent_dim(),
        ])))
        .expect("latent");
        assert!(invertor.generate(&latent, None).is_err());
    }

    #[test]
    fn test_reset_noise_enables_generate() {
        let mut invertor = Invertor::new(tiny_config()).expect("invertor");
        invertor.reset_noise(1).expect("reset");
        let g = invertor.generator();
        let latent = LatentCode::new(ArrayD::zeros(IxDyn(&[
            1,
            g.num_layers(),
            g.latent_dim(),
        ])))
        .expect("latent");
        let image = invertor.generate(&latent, None).expect("generate");
        assert_eq!(image.shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn test_step_budget_overrides() {
        let mut invertor = Invertor::new(tiny_config()).expect("invertor");
        let target = target_for(&invertor);
        let opts = EmbedOptions {
            w_epochs: Some(2),
            n_epochs: Some(1),
            ..EmbedOptions::default()
        };
        invertor
            .embed(&target, &["a".to_string()], &opts)
            .expect("embed");
        let report = invertor.last_report().expect("report");
        assert_eq!(report.total_steps(), 3);
    }
}
