//! Built-in style-based generator variant.
//!
//! A small synthesis network in the style-based mold: a learned base
//! constant, nearest-neighbor upsampling between resolutions, per-layer
//! style modulation driven by one latent row, per-layer noise injection and
//! a final 1x1 RGB projection. Weights are frozen; gradients flow only to
//! the latent and the noise maps.

use ndarray::{Array1, Array2, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{validate_embedding_shapes, Generator, GeneratorConfig, NoiseShape};
use crate::autograd::ops::{add_scaled, affine, channel_project, modulate, select_layer, upsample2x};
use crate::error::{Error, Result};
use crate::io::TensorState;
use crate::Tensor;

pub struct SyntheticGenerator {
    resolution: usize,
    base_resolution: usize,
    latent_dim: usize,
    channels: usize,
    base: ArrayD<f32>,
    mapping: Array2<f32>,
    style_weights: Vec<Array2<f32>>,
    style_biases: Vec<Array1<f32>>,
    noise_gain: Vec<f32>,
    rgb: Array2<f32>,
}

fn layer_count(base_resolution: usize, resolution: usize) -> usize {
    let mut layers = 1;
    let mut r = base_resolution;
    while r < resolution {
        r *= 2;
        layers += 1;
    }
    layers
}

impl SyntheticGenerator {
    /// Build from config: load the checkpoint when present, otherwise
    /// initialize seeded random weights.
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        if let Some(path) = &cfg.checkpoint {
            let generator = Self::load_checkpoint(path)?;
            if generator.resolution != cfg.resolution {
                return Err(Error::Configuration(format!(
                    "checkpoint resolution {} does not match configured resolution {}",
                    generator.resolution, cfg.resolution
                )));
            }
            return Ok(generator);
        }
        Self::seeded(cfg)
    }

    /// Seeded random weights at the configured geometry.
    pub fn seeded(cfg: &GeneratorConfig) -> Result<Self> {
        if !cfg.resolution.is_power_of_two() || !cfg.base_resolution.is_power_of_two() {
            return Err(Error::Configuration(format!(
                "resolutions must be powers of two, got base {} and output {}",
                cfg.base_resolution, cfg.resolution
            )));
        }
        if cfg.base_resolution < 2 || cfg.base_resolution > cfg.resolution {
            return Err(Error::Configuration(format!(
                "base resolution {} incompatible with output resolution {}",
                cfg.base_resolution, cfg.resolution
            )));
        }

        let (d, c) = (cfg.latent_dim, cfg.channels);
        let layers = layer_count(cfg.base_resolution, cfg.resolution);
        let mut rng = StdRng::seed_from_u64(cfg.weight_seed);

        let unit = Normal::new(0.0f32, 1.0).expect("valid normal");
        let fan_d = Normal::new(0.0f32, 1.0 / (d as f32).sqrt()).expect("valid normal");
        let fan_c = Normal::new(0.0f32, 1.0 / (c as f32).sqrt()).expect("valid normal");

        let r0 = cfg.base_resolution;
        let base = ArrayD::from_shape_fn(IxDyn(&[c, r0, r0]), |_| unit.sample(&mut rng));
        let mapping = Array2::from_shape_fn((d, d), |_| fan_d.sample(&mut rng));
        let mut style_weights = Vec::with_capacity(layers);
        let mut style_biases = Vec::with_capacity(layers);
        let mut noise_gain = Vec::with_capacity(layers);
        for layer in 0..layers {
            style_weights.push(Array2::from_shape_fn((d, c), |_| fan_d.sample(&mut rng)));
            style_biases.push(Array1::zeros(c));
            // Finer layers inject proportionally weaker noise
            noise_gain.push(0.1 / (layer as f32 + 1.0));
        }
        let rgb = Array2::from_shape_fn((c, 3), |_| fan_c.sample(&mut rng));

        Ok(Self {
            resolution: cfg.resolution,
            base_resolution: cfg.base_resolution,
            latent_dim: d,
            channels: c,
            base,
            mapping,
            style_weights,
            style_biases,
            noise_gain,
            rgb,
        })
    }

    /// Serialize the weights to a JSON checkpoint.
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = SyntheticCheckpoint {
            resolution: self.resolution,
            base_resolution: self.base_resolution,
            latent_dim: self.latent_dim,
            channels: self.channels,
            base: TensorState::from_array(&self.base),
            mapping: TensorState::from_array(&self.mapping.clone().into_dyn()),
            style_weights: self
                .style_weights
                .iter()
                .map(|w| TensorState::from_array(&w.clone().into_dyn()))
                .collect(),
            style_biases: self
                .style_biases
                .iter()
                .map(|b| TensorState::from_array(&b.clone().into_dyn()))
                .collect(),
            noise_gain: self.noise_gain.clone(),
            rgb: TensorState::from_array(&self.rgb.clone().into_dyn()),
        };
        let json = serde_json::to_string(&state)
            .map_err(|e| Error::Serialization(format!("checkpoint encode failed: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load weights from a JSON checkpoint.
    pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let state: SyntheticCheckpoint = serde_json::from_str(&json)
            .map_err(|e| Error::Serialization(format!("checkpoint decode failed: {e}")))?;

        let to_2d = |ts: &TensorState| -> Result<Array2<f32>> {
            ts.to_array()?
                .into_dimensionality()
                .map_err(|e| Error::Serialization(format!("checkpoint tensor rank: {e}")))
        };
        let to_1d = |ts: &TensorState| -> Result<Array1<f32>> {
            ts.to_array()?
                .into_dimensionality()
                .map_err(|e| Error::Serialization(format!("checkpoint tensor rank: {e}")))
        };

        Ok(Self {
            resolution: state.resolution,
            base_resolution: state.base_resolution,
            latent_dim: state.latent_dim,
            channels: state.channels,
            base: state.base.to_array()?,
            mapping: to_2d(&state.mapping)?,
            style_weights: state
                .style_weights
                .iter()
                .map(to_2d)
                .collect::<Result<Vec<_>>>()?,
            style_biases: state
                .style_biases
                .iter()
                .map(to_1d)
                .collect::<Result<Vec<_>>>()?,
            noise_gain: state.noise_gain,
            rgb: to_2d(&state.rgb)?,
        })
    }

    fn tiled_base(&self, batch: usize) -> ArrayD<f32> {
        let r0 = self.base_resolution;
        ArrayD::from_shape_fn(IxDyn(&[batch, self.channels, r0, r0]), |idx| {
            self.base[[idx[1], idx[2], idx[3]]]
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SyntheticCheckpoint {
    resolution: usize,
    base_resolution: usize,
    latent_dim: usize,
    channels: usize,
    base: TensorState,
    mapping: TensorState,
    style_weights: Vec<TensorState>,
    style_biases: Vec<TensorState>,
    noise_gain: Vec<f32>,
    rgb: TensorState,
}

impl Generator for SyntheticGenerator {
    fn resolution(&self) -> usize {
        self.resolution
    }

    fn num_layers(&self) -> usize {
        self.style_weights.len()
    }

    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn layer_noise_shapes(&self) -> Vec<NoiseShape> {
        (0..self.num_layers())
            .map(|layer| {
                let r = self.base_resolution << layer;
                NoiseShape {
                    height: r,
                    width: r,
                }
            })
            .collect()
    }

    fn mean_latent(&self, samples: usize, rng: &mut StdRng) -> ArrayD<f32> {
        let d = self.latent_dim;
        let unit = Normal::new(0.0f32, 1.0).expect("valid normal");
        let mut acc = Array1::<f32>::zeros(d);
        for _ in 0..samples.max(1) {
            let z = Array1::from_shape_fn(d, |_| unit.sample(rng));
            let w = z.dot(&self.mapping).mapv(f32::tanh);
            acc += &w;
        }
        acc /= samples.max(1) as f32;
        acc.into_dyn()
    }

    fn synthesize(&self, latent: &Tensor, noise: &[Tensor]) -> Result<Tensor> {
        let noise_shapes: Vec<Vec<usize>> = noise.iter().map(|n| n.shape()).collect();
        validate_embedding_shapes(self, &latent.shape(), &noise_shapes)?;
        let batch = latent.shape()[0];

        let mut x = Tensor::new(self.tiled_base(batch), false);
        for layer in 0..self.num_layers() {
            if layer > 0 {
                x = upsample2x(&x);
            }
            let w = select_layer(latent, layer);
            let style = affine(
                &w,
                &Tensor::new(self.style_weights[layer].clone().into_dyn(), false),
                &Tensor::new(self.style_biases[layer].clone().into_dyn(), false),
            );
            x = modulate(&x, &style);
            x = add_scaled(&x, &noise[layer], self.noise_gain[layer]);
        }
        Ok(channel_project(
            &x,
            &Tensor::new(self.rgb.clone().into_dyn(), false),
        ))
    }
}
