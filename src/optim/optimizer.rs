//! Optimizer trait

use crate::Tensor;

/// Trait for gradient-based update rules.
///
/// Parameters are passed per call; an optimizer keeps only its own state
/// (step counter, moment buffers) keyed by parameter position, which lets a
/// phase swap its parameter tensors between steps as long as the ordering is
/// stable.
pub trait Optimizer {
    /// Apply one update to every parameter that has a gradient.
    fn step(&mut self, params: &mut [Tensor]);

    /// Clear gradients on all parameters.
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Current learning rate.
    fn lr(&self) -> f32;

    /// Replace the learning rate (drives schedulers).
    fn set_lr(&mut self, lr: f32);
}
