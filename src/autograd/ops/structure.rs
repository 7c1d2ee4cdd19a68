//! Generator-facing autograd operations.
//!
//! A style-based synthesis pass is a chain of these ops: pick one layer's
//! latent row, project it to a per-channel style, modulate the feature map,
//! inject noise, and finally mix channels down to RGB. Each keeps gradients
//! flowing to both the latent code and the noise maps.

use ndarray::{ArrayD, Ix2, IxDyn};
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{BackwardOp, Tensor};

/// Slice one layer's latent row: `[B, L, D] -> [B, D]`.
///
/// Backward scatter-adds the row gradient back into the full latent tensor,
/// which is how a single latent leaf receives contributions from every
/// synthesis layer.
pub fn select_layer(latent: &Tensor, layer: usize) -> Tensor {
    let data = latent.data();
    let shape = data.shape().to_vec();
    assert_eq!(shape.len(), 3, "select_layer: expected [B, L, D], got {shape:?}");
    let (b, l, d) = (shape[0], shape[1], shape[2]);
    assert!(layer < l, "select_layer: layer {layer} out of {l}");

    let mut out = ArrayD::zeros(IxDyn(&[b, d]));
    for bi in 0..b {
        for di in 0..d {
            out[[bi, di]] = data[[bi, layer, di]];
        }
    }

    let requires_grad = latent.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(SelectLayerBackward {
            latent: latent.clone(),
            layer,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SelectLayerBackward {
    latent: Tensor,
    layer: usize,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for SelectLayerBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.latent.requires_grad() {
                let shape = self.latent.shape();
                let (b, _, d) = (shape[0], shape[1], shape[2]);
                let mut gl = ArrayD::zeros(IxDyn(&shape));
                for bi in 0..b {
                    for di in 0..d {
                        gl[[bi, self.layer, di]] = grad[[bi, di]];
                    }
                }
                self.latent.accumulate_grad(gl);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.latent.clone()]
    }
}

/// Batched affine projection: `[B, D] x [D, C] + [C] -> [B, C]`.
pub fn affine(x: &Tensor, weight: &Tensor, bias: &Tensor) -> Tensor {
    let xd = x
        .data()
        .into_dimensionality::<Ix2>()
        .expect("affine: x must be [B, D]");
    let wd = weight
        .data()
        .into_dimensionality::<Ix2>()
        .expect("affine: weight must be [D, C]");
    assert_eq!(xd.ncols(), wd.nrows(), "affine: inner dimension mismatch");
    let bd = bias.data();
    assert_eq!(bd.len(), wd.ncols(), "affine: bias length mismatch");

    let mut out = xd.dot(&wd);
    for mut row in out.rows_mut() {
        for (v, b) in row.iter_mut().zip(bd.iter()) {
            *v += *b;
        }
    }

    let requires_grad = x.requires_grad() || weight.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(out.into_dyn(), requires_grad);
    if requires_grad {
        let op = Rc::new(AffineBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AffineBackward {
    x: Tensor,
    weight: Tensor,
    bias: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for AffineBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = grad
                .clone()
                .into_dimensionality::<Ix2>()
                .expect("affine grad is [B, C]");
            if self.x.requires_grad() {
                let wd = self
                    .weight
                    .data()
                    .into_dimensionality::<Ix2>()
                    .expect("weight is [D, C]");
                self.x.accumulate_grad(g.dot(&wd.t()).into_dyn());
            }
            if self.weight.requires_grad() {
                let xd = self
                    .x
                    .data()
                    .into_dimensionality::<Ix2>()
                    .expect("x is [B, D]");
                self.weight.accumulate_grad(xd.t().dot(&g).into_dyn());
            }
            if self.bias.requires_grad() {
                self.bias
                    .accumulate_grad(g.sum_axis(ndarray::Axis(0)).into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.weight.clone(), self.bias.clone()]
    }
}

/// Style modulation: `out[b,c,i,j] = feat[b,c,i,j] * (1 + style[b,c])`.
pub fn modulate(feat: &Tensor, style: &Tensor) -> Tensor {
    let fd = feat.data();
    let sd = style.data();
    let fs = fd.shape().to_vec();
    assert_eq!(fs.len(), 4, "modulate: feat must be [B, C, H, W]");
    assert_eq!(sd.shape(), &[fs[0], fs[1]], "modulate: style must be [B, C]");
    let (b, c, h, w) = (fs[0], fs[1], fs[2], fs[3]);

    let mut out = ArrayD::zeros(IxDyn(&fs));
    for bi in 0..b {
        for ci in 0..c {
            let s = 1.0 + sd[[bi, ci]];
            for i in 0..h {
                for j in 0..w {
                    out[[bi, ci, i, j]] = fd[[bi, ci, i, j]] * s;
                }
            }
        }
    }

    let requires_grad = feat.requires_grad() || style.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(ModulateBackward {
            feat: feat.clone(),
            style: style.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ModulateBackward {
    feat: Tensor,
    style: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for ModulateBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let fd = self.feat.data();
            let sd = self.style.data();
            let fs = fd.shape().to_vec();
            let (b, c, h, w) = (fs[0], fs[1], fs[2], fs[3]);

            if self.feat.requires_grad() {
                let mut gf = ArrayD::zeros(IxDyn(&fs));
                for bi in 0..b {
                    for ci in 0..c {
                        let s = 1.0 + sd[[bi, ci]];
                        for i in 0..h {
                            for j in 0..w {
                                gf[[bi, ci, i, j]] = grad[[bi, ci, i, j]] * s;
                            }
                        }
                    }
                }
                self.feat.accumulate_grad(gf);
            }
            if self.style.requires_grad() {
                let mut gs = ArrayD::zeros(IxDyn(&[b, c]));
                for bi in 0..b {
                    for ci in 0..c {
                        let mut acc = 0.0;
                        for i in 0..h {
                            for j in 0..w {
                                acc += grad[[bi, ci, i, j]] * fd[[bi, ci, i, j]];
                            }
                        }
                        gs[[bi, ci]] = acc;
                    }
                }
                self.style.accumulate_grad(gs);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.feat.clone(), self.style.clone()]
    }
}

/// Noise injection: `out[b,c,i,j] = feat[b,c,i,j] + k * noise[b,0,i,j]`.
///
/// The single noise channel broadcasts across feature channels, so its
/// gradient sums over them (scaled by `k`).
pub fn add_scaled(feat: &Tensor, noise: &Tensor, k: f32) -> Tensor {
    let fd = feat.data();
    let nd = noise.data();
    let fs = fd.shape().to_vec();
    assert_eq!(fs.len(), 4, "add_scaled: feat must be [B, C, H, W]");
    assert_eq!(
        nd.shape(),
        &[fs[0], 1, fs[2], fs[3]],
        "add_scaled: noise must be [B, 1, H, W]"
    );
    let (b, c, h, w) = (fs[0], fs[1], fs[2], fs[3]);

    let mut out = ArrayD::zeros(IxDyn(&fs));
    for bi in 0..b {
        for ci in 0..c {
            for i in 0..h {
                for j in 0..w {
                    out[[bi, ci, i, j]] = fd[[bi, ci, i, j]] + k * nd[[bi, 0, i, j]];
                }
            }
        }
    }

    let requires_grad = feat.requires_grad() || noise.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(AddScaledBackward {
            feat: feat.clone(),
            noise: noise.clone(),
            k,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AddScaledBackward {
    feat: Tensor,
    noise: Tensor,
    k: f32,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for AddScaledBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.feat.requires_grad() {
                self.feat.accumulate_grad(grad.clone());
            }
            if self.noise.requires_grad() {
                let fs = self.feat.shape();
                let (b, c, h, w) = (fs[0], fs[1], fs[2], fs[3]);
                let mut gn = ArrayD::zeros(IxDyn(&[b, 1, h, w]));
                for bi in 0..b {
                    for i in 0..h {
                        for j in 0..w {
                            let mut acc = 0.0;
                            for ci in 0..c {
                                acc += grad[[bi, ci, i, j]];
                            }
                            gn[[bi, 0, i, j]] = self.k * acc;
                        }
                    }
                }
                self.noise.accumulate_grad(gn);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.feat.clone(), self.noise.clone()]
    }
}

/// 1x1 channel mix: `[B, C, H, W] x [C, K] -> [B, K, H, W]`.
pub fn channel_project(feat: &Tensor, mix: &Tensor) -> Tensor {
    let fd = feat.data();
    let md = mix
        .data()
        .into_dimensionality::<Ix2>()
        .expect("channel_project: mix must be [C, K]");
    let fs = fd.shape().to_vec();
    assert_eq!(fs.len(), 4, "channel_project: feat must be [B, C, H, W]");
    assert_eq!(fs[1], md.nrows(), "channel_project: channel mismatch");
    let (b, c, h, w) = (fs[0], fs[1], fs[2], fs[3]);
    let k = md.ncols();

    let mut out = ArrayD::zeros(IxDyn(&[b, k, h, w]));
    for bi in 0..b {
        for ki in 0..k {
            for i in 0..h {
                for j in 0..w {
                    let mut acc = 0.0;
                    for ci in 0..c {
                        acc += fd[[bi, ci, i, j]] * md[[ci, ki]];
                    }
                    out[[bi, ki, i, j]] = acc;
                }
            }
        }
    }

    let requires_grad = feat.requires_grad() || mix.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(ChannelProjectBackward {
            feat: feat.clone(),
            mix: mix.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ChannelProjectBackward {
    feat: Tensor,
    mix: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for ChannelProjectBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let fd = self.feat.data();
            let md = self
                .mix
                .data()
                .into_dimensionality::<Ix2>()
                .expect("mix is [C, K]");
            let fs = fd.shape().to_vec();
            let (b, c, h, w) = (fs[0], fs[1], fs[2], fs[3]);
            let k = md.ncols();

            if self.feat.requires_grad() {
                let mut gf = ArrayD::zeros(IxDyn(&fs));
                for bi in 0..b {
                    for ci in 0..c {
                        for i in 0..h {
                            for j in 0..w {
                                let mut acc = 0.0;
                                for ki in 0..k {
                                    acc += grad[[bi, ki, i, j]] * md[[ci, ki]];
                                }
                                gf[[bi, ci, i, j]] = acc;
                            }
                        }
                    }
                }
                self.feat.accumulate_grad(gf);
            }
            if self.mix.requires_grad() {
                let mut gm = ArrayD::zeros(IxDyn(&[c, k]));
                for ci in 0..c {
                    for ki in 0..k {
                        let mut acc = 0.0;
                        for bi in 0..b {
                            for i in 0..h {
                                for j in 0..w {
                                    acc += fd[[bi, ci, i, j]] * grad[[bi, ki, i, j]];
                                }
                            }
                        }
                        gm[[ci, ki]] = acc;
                    }
                }
                self.mix.accumulate_grad(gm);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.feat.clone(), self.mix.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use crate::autograd::ops::sum;
    use approx::assert_abs_diff_eq;

    fn tensor(shape: &[usize], values: Vec<f32>, requires_grad: bool) -> Tensor {
        Tensor::new(
            ArrayD::from_shape_vec(IxDyn(shape), values).expect("test tensor shape"),
            requires_grad,
        )
    }

    #[test]
    fn test_select_layer_scatter() {
        // [1, 2, 2] latent, pick layer 1
        let latent = tensor(&[1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], true);
        let row = select_layer(&latent, 1);
        assert_eq!(row.shape(), vec![1, 2]);
        assert_eq!(row.data()[[0, 0]], 3.0);

        let y = sum(&row);
        backward(&y);
        let g = latent.grad().expect("grad");
        assert_eq!(g[[0, 0, 0]], 0.0);
        assert_eq!(g[[0, 1, 0]], 1.0);
        assert_eq!(g[[0, 1, 1]], 1.0);
    }

    #[test]
    fn test_affine_forward_backward() {
        let x = tensor(&[1, 2], vec![1.0, 2.0], true);
        let w = tensor(&[2, 2], vec![1.0, 0.0, 0.0, 1.0], true);
        let b = tensor(&[2], vec![0.5, 0.5], true);
        let y = affine(&x, &w, &b);
        assert_abs_diff_eq!(y.data()[[0, 0]], 1.5);
        assert_abs_diff_eq!(y.data()[[0, 1]], 2.5);

        backward(&sum(&y));
        // identity weight: dx = [1, 1]; dw = x outer ones; db = ones
        assert_abs_diff_eq!(x.grad().expect("grad")[[0, 1]], 1.0);
        assert_abs_diff_eq!(w.grad().expect("grad")[[1, 0]], 2.0);
        assert_abs_diff_eq!(b.grad().expect("grad")[[0]], 1.0);
    }

    #[test]
    fn test_modulate_zero_style_is_identity() {
        let feat = tensor(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], true);
        let style = tensor(&[1, 1], vec![0.0], true);
        let y = modulate(&feat, &style);
        assert_eq!(y.data(), feat.data());

        backward(&sum(&y));
        // d/dstyle = sum of feat
        assert_abs_diff_eq!(style.grad().expect("grad")[[0, 0]], 10.0);
    }

    #[test]
    fn test_add_scaled_broadcasts_over_channels() {
        let feat = tensor(&[1, 2, 1, 1], vec![1.0, 2.0], true);
        let noise = tensor(&[1, 1, 1, 1], vec![0.5], true);
        let y = add_scaled(&feat, &noise, 2.0);
        assert_abs_diff_eq!(y.data()[[0, 0, 0, 0]], 2.0);
        assert_abs_diff_eq!(y.data()[[0, 1, 0, 0]], 3.0);

        backward(&sum(&y));
        // noise feeds both channels: 2 (channels) * k
        assert_abs_diff_eq!(noise.grad().expect("grad")[[0, 0, 0, 0]], 4.0);
    }

    #[test]
    fn test_channel_project_mixes() {
        let feat = tensor(&[1, 2, 1, 1], vec![1.0, 2.0], true);
        let mix = tensor(&[2, 1], vec![3.0, 4.0], true);
        let y = channel_project(&feat, &mix);
        assert_eq!(y.shape(), vec![1, 1, 1, 1]);
        assert_abs_diff_eq!(y.data()[[0, 0, 0, 0]], 11.0);

        backward(&sum(&y));
        assert_abs_diff_eq!(feat.grad().expect("grad")[[0, 1, 0, 0]], 4.0);
        assert_abs_diff_eq!(mix.grad().expect("grad")[[0, 0]], 1.0);
        assert_abs_diff_eq!(mix.grad().expect("grad")[[1, 0]], 2.0);
    }
}
