//! Spatial autograd operations over `[B, C, H, W]` tensors.
//!
//! These are the primitives the reconstruction pyramid and the noise
//! autocorrelation penalty are built from: 2x2 average pooling, nearest
//! neighbor upsampling and single-pixel circular shifts.

use ndarray::{ArrayD, IxDyn};
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{BackwardOp, Tensor};

/// Axis of a circular shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAxis {
    Height,
    Width,
}

fn bchw(shape: &[usize]) -> (usize, usize, usize, usize) {
    assert_eq!(shape.len(), 4, "expected a [B, C, H, W] tensor, got {shape:?}");
    (shape[0], shape[1], shape[2], shape[3])
}

/// 2x2 average pooling with stride 2. Spatial dims must be even.
pub fn avg_pool2d(x: &Tensor) -> Tensor {
    let data = x.data();
    let (b, c, h, w) = bchw(data.shape());
    assert!(h % 2 == 0 && w % 2 == 0, "avg_pool2d: odd spatial size {h}x{w}");

    let (oh, ow) = (h / 2, w / 2);
    let mut out = ArrayD::zeros(IxDyn(&[b, c, oh, ow]));
    for bi in 0..b {
        for ci in 0..c {
            for i in 0..oh {
                for j in 0..ow {
                    let s = data[[bi, ci, 2 * i, 2 * j]]
                        + data[[bi, ci, 2 * i, 2 * j + 1]]
                        + data[[bi, ci, 2 * i + 1, 2 * j]]
                        + data[[bi, ci, 2 * i + 1, 2 * j + 1]];
                    out[[bi, ci, i, j]] = s * 0.25;
                }
            }
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(AvgPoolBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AvgPoolBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for AvgPoolBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let shape = self.x.shape();
                let (b, c, h, w) = bchw(&shape);
                let mut gx = ArrayD::zeros(IxDyn(&shape));
                for bi in 0..b {
                    for ci in 0..c {
                        for i in 0..h / 2 {
                            for j in 0..w / 2 {
                                let g = grad[[bi, ci, i, j]] * 0.25;
                                gx[[bi, ci, 2 * i, 2 * j]] += g;
                                gx[[bi, ci, 2 * i, 2 * j + 1]] += g;
                                gx[[bi, ci, 2 * i + 1, 2 * j]] += g;
                                gx[[bi, ci, 2 * i + 1, 2 * j + 1]] += g;
                            }
                        }
                    }
                }
                self.x.accumulate_grad(gx);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }
}

/// Nearest-neighbor 2x upsampling.
pub fn upsample2x(x: &Tensor) -> Tensor {
    let data = x.data();
    let (b, c, h, w) = bchw(data.shape());

    let mut out = ArrayD::zeros(IxDyn(&[b, c, 2 * h, 2 * w]));
    for bi in 0..b {
        for ci in 0..c {
            for i in 0..2 * h {
                for j in 0..2 * w {
                    out[[bi, ci, i, j]] = data[[bi, ci, i / 2, j / 2]];
                }
            }
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(UpsampleBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct UpsampleBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for UpsampleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let shape = self.x.shape();
                let (b, c, h, w) = bchw(&shape);
                let mut gx = ArrayD::zeros(IxDyn(&shape));
                for bi in 0..b {
                    for ci in 0..c {
                        for i in 0..2 * h {
                            for j in 0..2 * w {
                                gx[[bi, ci, i / 2, j / 2]] += grad[[bi, ci, i, j]];
                            }
                        }
                    }
                }
                self.x.accumulate_grad(gx);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }
}

/// Circular shift by one pixel along the given spatial axis.
///
/// `out[..., i] = x[..., (i + 1) % len]`; the backward pass applies the
/// inverse rotation to the gradient.
pub fn shift2d(x: &Tensor, axis: ShiftAxis) -> Tensor {
    let data = x.data();
    let (b, c, h, w) = bchw(data.shape());

    let mut out = ArrayD::zeros(IxDyn(&[b, c, h, w]));
    for bi in 0..b {
        for ci in 0..c {
            for i in 0..h {
                for j in 0..w {
                    let (si, sj) = match axis {
                        ShiftAxis::Height => ((i + 1) % h, j),
                        ShiftAxis::Width => (i, (j + 1) % w),
                    };
                    out[[bi, ci, i, j]] = data[[bi, ci, si, sj]];
                }
            }
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(ShiftBackward {
            x: x.clone(),
            axis,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ShiftBackward {
    x: Tensor,
    axis: ShiftAxis,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for ShiftBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let shape = self.x.shape();
                let (b, c, h, w) = bchw(&shape);
                let mut gx = ArrayD::zeros(IxDyn(&shape));
                for bi in 0..b {
                    for ci in 0..c {
                        for i in 0..h {
                            for j in 0..w {
                                let (si, sj) = match self.axis {
                                    ShiftAxis::Height => ((i + 1) % h, j),
                                    ShiftAxis::Width => (i, (j + 1) % w),
                                };
                                gx[[bi, ci, si, sj]] += grad[[bi, ci, i, j]];
                            }
                        }
                    }
                }
                self.x.accumulate_grad(gx);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }
}
