//! Differentiable operations over tape tensors.

mod basic;
mod image;
mod structure;

pub use basic::{add, batch_mean, mean, mul, scale, sub, sum};
pub use image::{avg_pool2d, shift2d, upsample2x, ShiftAxis};
pub use structure::{add_scaled, affine, channel_project, modulate, select_layer};
