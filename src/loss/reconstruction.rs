//! Pixel + multi-scale reconstruction distance.

use super::mse;
use crate::autograd::ops::{add, avg_pool2d, scale};
use crate::Tensor;

/// Weighted combination of pixel-space MSE and a multi-scale perceptual
/// distance computed over an image pyramid: coarser copies of the two images
/// are compared so that low-frequency structure counts beyond per-pixel
/// agreement.
#[derive(Debug, Clone)]
pub struct ReconstructionLoss {
    pixel_weight: f32,
    perceptual_weight: f32,
    levels: usize,
}

impl ReconstructionLoss {
    pub fn new(pixel_weight: f32, perceptual_weight: f32, levels: usize) -> Self {
        Self {
            pixel_weight,
            perceptual_weight,
            levels,
        }
    }

    /// Scalar loss between a generated image and the target, both
    /// `[B, C, H, W]`. Keeps the target out of the tape.
    pub fn forward(&self, generated: &Tensor, target: &Tensor) -> Tensor {
        assert_eq!(
            generated.shape(),
            target.shape(),
            "reconstruction loss: image shapes differ"
        );

        let mut total = scale(&mse(generated, target), self.pixel_weight);

        if self.perceptual_weight > 0.0 && self.levels > 0 {
            let mut g = generated.clone();
            let mut t = target.clone();
            for _ in 0..self.levels {
                // Stop once another 2x downsample would drop below 2 pixels
                let side = g.shape()[2].min(g.shape()[3]);
                if side < 4 || side % 2 != 0 {
                    break;
                }
                g = avg_pool2d(&g);
                t = avg_pool2d(&t);
                total = add(&total, &scale(&mse(&g, &t), self.perceptual_weight));
            }
        }
        total
    }
}

impl Default for ReconstructionLoss {
    fn default() -> Self {
        Self::new(1.0, 1.0, 3)
    }
}
