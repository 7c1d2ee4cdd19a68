//! Invertir: latent-space image inversion and editing through a frozen
//! style-based generator.
//!
//! The engine recovers a `(latent, noise)` embedding for a target image by
//! gradient descent through the generator, in two phases: latent-only
//! descent against frozen noise, then joint descent over latent and noise
//! maps with an autocorrelation penalty that keeps the maps carrying noise
//! rather than image content. Recovered embeddings support resampling,
//! layer-wise mixing and style transfer, all without further optimization.
//!
//! # Example
//!
//! ```no_run
//! use invertir::{EmbedOptions, Invertor, InvertorConfig};
//! use ndarray::ArrayD;
//!
//! let mut invertor = Invertor::new(InvertorConfig::default()).unwrap();
//! let target = ArrayD::<f32>::zeros(ndarray::IxDyn(&[1, 3, 64, 64]));
//! let embedding = invertor
//!     .embed(&target, &["face".to_string()], &EmbedOptions::default())
//!     .unwrap();
//! let reconstruction = invertor
//!     .generate(embedding.latent(), Some(embedding.noise()))
//!     .unwrap();
//! ```

pub mod autograd;
pub mod cli;
pub mod error;
pub mod generator;
pub mod invertor;
pub mod io;
pub mod latent;
pub mod loss;
pub mod optim;
pub mod pipeline;

pub use autograd::Tensor;
pub use error::{Error, Result};
pub use invertor::{EmbedOptions, Invertor, InvertorConfig, Phase, RunReport};
pub use latent::{Embedding, LatentCode, NoiseList};
