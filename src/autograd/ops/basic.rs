//! Elementwise and reduction autograd operations: add, sub, mul, scale, sum,
//! mean, batch_mean

use ndarray::{ArrayD, IxDyn};
use std::cell::RefCell;
use std::rc::Rc;

use crate::autograd::{BackwardOp, Tensor};

/// Add two tensors elementwise.
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "add: shape mismatch");
    let data = a.data() + &*b.data_ref();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Subtract `b` from `a` elementwise.
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "sub: shape mismatch");
    let data = a.data() - &*b.data_ref();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(SubBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SubBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for SubBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.mapv(|g| -g));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Multiply two tensors elementwise.
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "mul: shape mismatch");
    let data = a.data() * &*b.data_ref();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for MulBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * b
                self.a.accumulate_grad(grad * &*self.b.data_ref());
            }
            if self.b.requires_grad() {
                // ∂L/∂b = ∂L/∂out * a
                self.b.accumulate_grad(grad * &*self.a.data_ref());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Scale a tensor by a scalar factor.
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data_ref().mapv(|v| v * factor);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.mapv(|g| g * self.factor));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Sum all elements into a scalar (shape `[1]`) tensor.
pub fn sum(a: &Tensor) -> Tensor {
    let total = a.data_ref().sum();
    let requires_grad = a.requires_grad();

    let mut result = Tensor::scalar(total, requires_grad);
    if requires_grad {
        let op = Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SumBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for SumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad[[0]];
                let shape = self.a.shape();
                self.a.accumulate_grad(ArrayD::from_elem(IxDyn(&shape), g));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Mean of all elements as a scalar tensor.
pub fn mean(a: &Tensor) -> Tensor {
    let n = a.len() as f32;
    let avg = a.data_ref().sum() / n;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::scalar(avg, requires_grad);
    if requires_grad {
        let op = Rc::new(MeanBackward {
            a: a.clone(),
            n,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct MeanBackward {
    a: Tensor,
    n: f32,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for MeanBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let g = grad[[0]] / self.n;
                let shape = self.a.shape();
                self.a.accumulate_grad(ArrayD::from_elem(IxDyn(&shape), g));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Per-example mean: `[B, ...] -> [B]`, averaging each example's trailing
/// axes separately. Reductions built on this never mix gradient across the
/// batch dimension.
pub fn batch_mean(a: &Tensor) -> Tensor {
    let data = a.data();
    let shape = data.shape().to_vec();
    assert!(shape.len() >= 2, "batch_mean: expected [B, ...], got {shape:?}");
    let b = shape[0];
    let per: usize = shape[1..].iter().product();
    assert!(per > 0, "batch_mean: empty examples");

    let mut out = ArrayD::zeros(IxDyn(&[b]));
    for bi in 0..b {
        out[[bi]] = data.index_axis(ndarray::Axis(0), bi).sum() / per as f32;
    }

    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(BatchMeanBackward {
            a: a.clone(),
            per: per as f32,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct BatchMeanBackward {
    a: Tensor,
    per: f32,
    result_grad: Rc<RefCell<Option<ArrayD<f32>>>>,
}

impl BackwardOp for BatchMeanBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let shape = self.a.shape();
                let mut gx = ArrayD::zeros(IxDyn(&shape));
                for bi in 0..shape[0] {
                    gx.index_axis_mut(ndarray::Axis(0), bi)
                        .fill(grad[[bi]] / self.per);
                }
                self.a.accumulate_grad(gx);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}
