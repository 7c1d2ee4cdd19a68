//! Finite-difference gradient checking for op tests.

use ndarray::{ArrayD, IxDyn};

/// Numerical gradient of `f` at `x` via central differences:
/// f'(x) ≈ (f(x + h) - f(x - h)) / (2h)
pub fn finite_difference<F>(f: F, x: &ArrayD<f32>, epsilon: f32) -> ArrayD<f32>
where
    F: Fn(&ArrayD<f32>) -> f32,
{
    let mut grad = ArrayD::zeros(IxDyn(x.shape()));
    let mut probe = x.clone();

    for idx in 0..x.len() {
        let flat = probe.as_slice_mut().expect("contiguous probe array");
        let original = flat[idx];

        flat[idx] = original + epsilon;
        let f_plus = f(&probe);

        let flat = probe.as_slice_mut().expect("contiguous probe array");
        flat[idx] = original - epsilon;
        let f_minus = f(&probe);

        let flat = probe.as_slice_mut().expect("contiguous probe array");
        flat[idx] = original;

        grad.as_slice_mut().expect("contiguous grad array")[idx] =
            (f_plus - f_minus) / (2.0 * epsilon);
    }

    grad
}
