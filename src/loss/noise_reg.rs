//! Noise autocorrelation penalty.

use crate::autograd::ops::{add, avg_pool2d, batch_mean, mul, scale, shift2d, sum, ShiftAxis};
use crate::Tensor;

/// Penalize spatial structure inside the noise maps.
///
/// Pure per-pixel noise decorrelates with any shifted copy of itself, so for
/// each map we square the mean product with its one-pixel circular shifts
/// along both axes, then repeat on 2x-downsampled copies until the map is
/// 8x8 or smaller. The shift-product mean and its square are taken per
/// example, so the penalty is a batch average of independent per-example
/// terms and one example's gradient never depends on another's maps. The
/// per-layer weight decays geometrically with layer index: coarse maps carry
/// structure the reconstruction term cannot explain away, so they are
/// penalized hardest.
pub fn noise_regularization(noise: &[Tensor], base_weight: f32, layer_decay: f32) -> Tensor {
    let mut total = Tensor::scalar(0.0, false);

    for (layer, map) in noise.iter().enumerate() {
        let weight = base_weight * layer_decay.powi(layer as i32);
        let batch = map.shape()[0];
        let mut current = map.clone();
        loop {
            let mh = batch_mean(&mul(&current, &shift2d(&current, ShiftAxis::Height)));
            let mw = batch_mean(&mul(&current, &shift2d(&current, ShiftAxis::Width)));
            let term = add(&mul(&mh, &mh), &mul(&mw, &mw));
            total = add(&total, &scale(&sum(&term), weight / batch as f32));

            let side = current.shape()[2].min(current.shape()[3]);
            if side <= 8 {
                break;
            }
            current = avg_pool2d(&current);
        }
    }
    total
}
