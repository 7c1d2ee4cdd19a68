//! Loss terms driving the embedding search.

mod noise_reg;
mod reconstruction;

pub use noise_reg::noise_regularization;
pub use reconstruction::ReconstructionLoss;

use crate::autograd::ops::{mean, mul, sub};
use crate::Tensor;

/// Mean squared error as a scalar graph node.
pub fn mse(a: &Tensor, b: &Tensor) -> Tensor {
    let diff = sub(a, b);
    mean(&mul(&diff, &diff))
}
