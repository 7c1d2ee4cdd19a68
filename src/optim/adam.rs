//! Adam optimizer

use ndarray::ArrayD;

use super::Optimizer;
use crate::Tensor;

/// Adam optimizer with bias-corrected first and second moments.
///
/// m_t = β1·m_{t-1} + (1-β1)·g
/// v_t = β2·v_{t-1} + (1-β2)·g²
/// θ_t = θ_{t-1} - lr_t · m_t / (√v_t + ε)
///
/// where `lr_t` folds the bias correction of both moments.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<ArrayD<f32>>>,
    v: Vec<Option<ArrayD<f32>>>,
}

impl Adam {
    /// Create a new Adam optimizer.
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Adam with the standard (0.9, 0.999, 1e-8) hyperparameters.
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Number of steps taken so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.m.len() < params.len() {
            self.m.resize(params.len(), None);
            self.v.resize(params.len(), None);
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction folded into the step size
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else { continue };

            if self.m[i].is_none() {
                self.m[i] = Some(ArrayD::zeros(grad.raw_dim()));
                self.v[i] = Some(ArrayD::zeros(grad.raw_dim()));
            }
            let m = self.m[i].as_mut().expect("first moment initialized above");
            let v = self.v[i].as_mut().expect("second moment initialized above");

            m.zip_mut_with(&grad, |mi, &g| {
                *mi = self.beta1 * *mi + (1.0 - self.beta1) * g;
            });
            v.zip_mut_with(&grad, |vi, &g| {
                *vi = self.beta2 * *vi + (1.0 - self.beta2) * g * g;
            });

            let mut data = param.data_mut();
            let epsilon = self.epsilon;
            ndarray::Zip::from(&mut *data)
                .and(&*m)
                .and(&*v)
                .for_each(|d, &mi, &vi| {
                    *d -= lr_t * mi / (vi.sqrt() + epsilon);
                });
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
