//! Data model for recovered embeddings: latent codes, noise lists and the
//! pair that fully determines one reconstructed image.

mod algebra;

pub use algebra::{
    mix, mix_latent, random_noise, resample, style_transfer, transfer_latent,
    DEFAULT_RESAMPLE_SCALE,
};

use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};
use crate::generator::Generator;
use crate::Tensor;

/// A `[batch, num_layers, latent_dim]` latent code, one row per synthesis
/// layer so that layer-wise mixing is a slice operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentCode(ArrayD<f32>);

impl LatentCode {
    /// Wrap an array, requiring the `[batch, layers, dim]` rank.
    pub fn new(data: ArrayD<f32>) -> Result<Self> {
        if data.ndim() != 3 {
            return Err(Error::Configuration(format!(
                "latent code must be [batch, layers, dim], got shape {:?}",
                data.shape()
            )));
        }
        Ok(Self(data))
    }

    pub fn batch(&self) -> usize {
        self.0.shape()[0]
    }

    pub fn num_layers(&self) -> usize {
        self.0.shape()[1]
    }

    pub fn dim(&self) -> usize {
        self.0.shape()[2]
    }

    pub fn as_array(&self) -> &ArrayD<f32> {
        &self.0
    }

    pub fn into_array(self) -> ArrayD<f32> {
        self.0
    }

    /// Leaf tensor over a copy of this code.
    pub fn to_tensor(&self, requires_grad: bool) -> Tensor {
        Tensor::new(self.0.clone(), requires_grad)
    }

    /// Single-example slice as a fresh `[1, layers, dim]` code.
    pub fn example(&self, index: usize) -> Result<LatentCode> {
        if index >= self.batch() {
            return Err(Error::Configuration(format!(
                "example {index} out of batch {}",
                self.batch()
            )));
        }
        let (l, d) = (self.num_layers(), self.dim());
        let data = ArrayD::from_shape_fn(IxDyn(&[1, l, d]), |idx| {
            self.0[[index, idx[1], idx[2]]]
        });
        Ok(LatentCode(data))
    }
}

/// Ordered per-layer noise maps, each `[batch, 1, h, w]` at the shape the
/// generator declared for that layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseList(Vec<ArrayD<f32>>);

impl NoiseList {
    /// Wrap a list of maps, requiring rank 4, a single channel and a
    /// consistent batch dimension.
    pub fn new(maps: Vec<ArrayD<f32>>) -> Result<Self> {
        let mut batch = None;
        for (index, map) in maps.iter().enumerate() {
            let shape = map.shape();
            if shape.len() != 4 || shape[1] != 1 {
                return Err(Error::Configuration(format!(
                    "noise map {index} must be [batch, 1, h, w], got {shape:?}"
                )));
            }
            match batch {
                None => batch = Some(shape[0]),
                Some(b) if b != shape[0] => {
                    return Err(Error::Configuration(format!(
                        "noise map {index} batch {} disagrees with {b}",
                        shape[0]
                    )));
                }
                _ => {}
            }
        }
        Ok(Self(maps))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn batch(&self) -> usize {
        self.0.first().map_or(0, |m| m.shape()[0])
    }

    pub fn maps(&self) -> &[ArrayD<f32>] {
        &self.0
    }

    pub fn into_maps(self) -> Vec<ArrayD<f32>> {
        self.0
    }

    /// Leaf tensors over copies of the maps.
    pub fn to_tensors(&self, requires_grad: bool) -> Vec<Tensor> {
        self.0
            .iter()
            .map(|m| Tensor::new(m.clone(), requires_grad))
            .collect()
    }

    /// Single-example slice as a fresh batch-1 noise list.
    pub fn example(&self, index: usize) -> Result<NoiseList> {
        if index >= self.batch() {
            return Err(Error::Configuration(format!(
                "example {index} out of batch {}",
                self.batch()
            )));
        }
        let maps = self
            .0
            .iter()
            .map(|m| {
                let (h, w) = (m.shape()[2], m.shape()[3]);
                ArrayD::from_shape_fn(IxDyn(&[1, 1, h, w]), |idx| {
                    m[[index, 0, idx[2], idx[3]]]
                })
            })
            .collect();
        Ok(NoiseList(maps))
    }

    /// Check this list against a generator's declared layer shapes.
    pub fn validate_against(&self, generator: &dyn Generator) -> Result<()> {
        let declared = generator.layer_noise_shapes();
        if self.len() != declared.len() {
            return Err(Error::Configuration(format!(
                "noise list has {} maps, generator expects {}",
                self.len(),
                declared.len()
            )));
        }
        for (index, (map, expected)) in self.0.iter().zip(declared.iter()).enumerate() {
            let shape = map.shape();
            if shape[2] != expected.height || shape[3] != expected.width {
                return Err(Error::Configuration(format!(
                    "noise map {index} is {}x{}, generator expects {}x{}",
                    shape[2], shape[3], expected.height, expected.width
                )));
            }
        }
        Ok(())
    }
}

/// The recovered `(latent, noise list)` pair. Immutable once built; all
/// extraction paths copy, so later optimizer work cannot touch a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    latent: LatentCode,
    noise: NoiseList,
}

impl Embedding {
    /// Pair a latent with its noise list, requiring matching batches.
    pub fn new(latent: LatentCode, noise: NoiseList) -> Result<Self> {
        if !noise.is_empty() && latent.batch() != noise.batch() {
            return Err(Error::Configuration(format!(
                "latent batch {} does not match noise batch {}",
                latent.batch(),
                noise.batch()
            )));
        }
        Ok(Self { latent, noise })
    }

    pub fn latent(&self) -> &LatentCode {
        &self.latent
    }

    pub fn noise(&self) -> &NoiseList {
        &self.noise
    }

    pub fn batch(&self) -> usize {
        self.latent.batch()
    }

    pub fn into_parts(self) -> (LatentCode, NoiseList) {
        (self.latent, self.noise)
    }

    /// Single-example embedding.
    pub fn example(&self, index: usize) -> Result<Embedding> {
        Embedding::new(self.latent.example(index)?, self.noise.example(index)?)
    }
}
