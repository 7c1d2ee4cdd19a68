//! Tape-based autograd engine over shaped ndarray storage.
//!
//! Every differentiable operation records a backward op holding clones of its
//! inputs and a handle to the output's gradient cell. [`backward`] walks the
//! recorded graph in reverse topological order, visiting each op exactly
//! once, so intermediates consumed by several ops (image pyramids, shift
//! products) receive correctly summed gradients.

mod backward;
pub mod ops;
mod tensor;

#[cfg(test)]
mod grad_check;

pub use backward::{backward, BackwardOp};
pub use tensor::Tensor;
