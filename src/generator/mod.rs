//! Generator adapter: the differentiable boundary around a pretrained
//! style-based generator.

mod registry;
mod synthetic;

pub use registry::{GeneratorCtor, GeneratorRegistry};
pub use synthetic::SyntheticGenerator;

use ndarray::ArrayD;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::Tensor;

/// Spatial shape of one layer's noise map (`[B, 1, height, width]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseShape {
    pub height: usize,
    pub width: usize,
}

/// A pretrained generator seen through its optimization-facing surface.
///
/// `synthesize` must be differentiable end-to-end with respect to both the
/// latent code and every noise map; the weights behind it are frozen.
pub trait Generator {
    /// Output image side length (images are `[B, 3, r, r]`).
    fn resolution(&self) -> usize;

    /// Number of synthesis layers (latent codes are `[B, layers, dim]`).
    fn num_layers(&self) -> usize;

    /// Width of one latent row.
    fn latent_dim(&self) -> usize;

    /// Expected noise map shape per layer, in layer order.
    fn layer_noise_shapes(&self) -> Vec<NoiseShape>;

    /// Deterministic "center of latent space": the mapped latent averaged
    /// over `samples` random seeds. Forward-only, no tape.
    fn mean_latent(&self, samples: usize, rng: &mut StdRng) -> ArrayD<f32>;

    /// Render an image from a `[B, layers, dim]` latent and per-layer noise.
    fn synthesize(&self, latent: &Tensor, noise: &[Tensor]) -> Result<Tensor>;
}

/// Check a latent/noise pairing against a generator's declared geometry.
///
/// Runs before any optimizer step or synthesis call so that bad geometry
/// fails up front, never as a mid-loop surprise. Malformed input (wrong
/// rank, wrong map count) is a configuration error; well-formed input with
/// the wrong dimensions reports the expected and actual shapes.
pub fn validate_embedding_shapes(
    generator: &dyn Generator,
    latent_shape: &[usize],
    noise_shapes: &[Vec<usize>],
) -> Result<()> {
    let layers = generator.num_layers();
    let dim = generator.latent_dim();

    if latent_shape.len() != 3 {
        return Err(Error::Configuration(format!(
            "latent shape {latent_shape:?} is not [batch, layers, dim]"
        )));
    }
    if latent_shape[1] != layers || latent_shape[2] != dim {
        return Err(Error::ShapeMismatch {
            expected: vec![latent_shape[0], layers, dim],
            actual: latent_shape.to_vec(),
        });
    }
    let batch = latent_shape[0];

    let declared = generator.layer_noise_shapes();
    if noise_shapes.len() != declared.len() {
        return Err(Error::Configuration(format!(
            "noise list has {} entries, generator expects {}",
            noise_shapes.len(),
            declared.len()
        )));
    }
    for (shape, expected) in noise_shapes.iter().zip(declared.iter()) {
        let want = vec![batch, 1, expected.height, expected.width];
        if shape != &want {
            return Err(Error::ShapeMismatch {
                expected: want,
                actual: shape.clone(),
            });
        }
    }
    Ok(())
}

/// Construction parameters for a generator variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Registry tag of the variant to build.
    pub variant: String,
    /// Output resolution (power of two).
    pub resolution: usize,
    /// Resolution of the learned base constant.
    pub base_resolution: usize,
    /// Latent row width.
    pub latent_dim: usize,
    /// Feature channels carried through synthesis.
    pub channels: usize,
    /// Checkpoint to load weights from; seeded random weights when absent.
    pub checkpoint: Option<PathBuf>,
    /// Seed for random weight initialization.
    pub weight_seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            variant: "synthetic".to_string(),
            resolution: 64,
            base_resolution: 4,
            latent_dim: 32,
            channels: 16,
            checkpoint: None,
            weight_seed: 7,
        }
    }
}
