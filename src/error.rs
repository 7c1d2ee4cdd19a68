//! Error types for the inversion pipeline.

use thiserror::Error;

use crate::invertor::Phase;

/// Errors surfaced by the inversion pipeline.
///
/// There is no recoverable category inside the optimization loop: shape
/// problems are caught before the loop starts, and divergence aborts the
/// current embed call outright.
#[derive(Debug, Error)]
pub enum Error {
    /// Generator / target / loaded-embedding disagreement detected eagerly,
    /// before any optimizer step runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tensor shape mismatch inside an operation.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// NaN or Inf appeared in the loss. Carries the phase and step so the
    /// caller can distinguish early blow-up from late instability.
    #[error("numeric divergence: non-finite loss in {phase} at step {step}")]
    NumericDivergence { phase: Phase, step: usize },

    /// Unknown generator variant tag.
    #[error("unknown generator variant: {0}")]
    UnknownVariant(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Result type for invertir operations.
pub type Result<T> = std::result::Result<T, Error>;
