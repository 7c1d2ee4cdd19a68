//! Mutable state threaded through one embedding run.

use ndarray::ArrayD;

use crate::autograd::Tensor;
use crate::latent::{Embedding, LatentCode, NoiseList};

const STD_FLOOR: f32 = 1e-8;

/// The optimizable state of a single embedding run. The latent is trainable
/// from the start; noise maps begin frozen and are promoted when the joint
/// phase opens.
pub struct RunState {
    latent: Tensor,
    noise: Vec<Tensor>,
    loss_history: Vec<f32>,
    latent_steps: usize,
    joint_steps: usize,
}

impl RunState {
    pub fn new(latent: Tensor, noise: Vec<Tensor>) -> Self {
        Self {
            latent,
            noise,
            loss_history: Vec::new(),
            latent_steps: 0,
            joint_steps: 0,
        }
    }

    pub fn latent(&self) -> &Tensor {
        &self.latent
    }

    pub fn noise(&self) -> &[Tensor] {
        &self.noise
    }

    /// Parameter list for the latent phase.
    pub fn latent_params(&self) -> Vec<Tensor> {
        vec![self.latent.clone()]
    }

    /// Parameter list for the joint phase. Ordering is stable across steps
    /// so positional optimizer moments stay attached to the right slot even
    /// when a noise tensor is swapped by renormalization.
    pub fn joint_params(&self) -> Vec<Tensor> {
        let mut params = vec![self.latent.clone()];
        params.extend(self.noise.iter().cloned());
        params
    }

    /// Replace the frozen noise maps with trainable copies.
    pub fn promote_noise(&mut self) {
        self.noise = self
            .noise
            .iter()
            .map(|n| Tensor::new(n.data(), true))
            .collect();
    }

    /// Re-project every noise map onto zero mean and unit variance,
    /// per example and per map. Each map is replaced by a fresh trainable
    /// tensor rather than mutated in place, so stale graph references
    /// cannot leak across steps.
    pub fn renormalize_noise(&mut self) {
        let mut renormed = Vec::with_capacity(self.noise.len());
        for map in &self.noise {
            let data = map.data();
            let shape = data.shape().to_vec();
            let batch = shape[0];
            let per_example: usize = shape[1..].iter().product();

            let mut flat = data.into_raw_vec_and_offset().0;
            for b in 0..batch {
                let slice = &mut flat[b * per_example..(b + 1) * per_example];
                let mean = slice.iter().sum::<f32>() / per_example as f32;
                let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f32>()
                    / per_example as f32;
                let std = var.sqrt().max(STD_FLOOR);
                for v in slice.iter_mut() {
                    *v = (*v - mean) / std;
                }
            }
            let arr = ArrayD::from_shape_vec(shape, flat).expect("same length");
            renormed.push(Tensor::new(arr, true));
        }
        self.noise = renormed;
    }

    pub fn record_loss(&mut self, loss: f32) {
        self.loss_history.push(loss);
    }

    pub fn loss_history(&self) -> &[f32] {
        &self.loss_history
    }

    pub fn count_latent_step(&mut self) {
        self.latent_steps += 1;
    }

    pub fn count_joint_step(&mut self) {
        self.joint_steps += 1;
    }

    pub fn latent_steps(&self) -> usize {
        self.latent_steps
    }

    pub fn joint_steps(&self) -> usize {
        self.joint_steps
    }

    pub fn take_history(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.loss_history)
    }

    /// Detach the optimized state into a final embedding.
    pub fn into_embedding(self) -> crate::error::Result<Embedding> {
        let latent = LatentCode::new(self.latent.data())?;
        let maps = self.noise.iter().map(|n| n.data()).collect();
        let noise = NoiseList::new(maps)?;
        Embedding::new(latent, noise)
    }
}
