//! Shaped tape tensor with shared storage

use ndarray::{ArrayD, IxDyn};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::backward::BackwardOp;

/// A tensor participating in the computational graph.
///
/// Storage, gradient and the backward-op slot are reference-counted, so
/// cloning a `Tensor` produces another handle to the same node. Leaf tensors
/// (optimization variables) have no backward op; their gradient cell is where
/// the backward pass deposits accumulated gradients.
#[derive(Clone)]
pub struct Tensor {
    data: Rc<RefCell<ArrayD<f32>>>,
    grad: Rc<RefCell<Option<ArrayD<f32>>>>,
    backward_op: Rc<RefCell<Option<Rc<dyn BackwardOp>>>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor from an ndarray.
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
            grad: Rc::new(RefCell::new(None)),
            backward_op: Rc::new(RefCell::new(None)),
            requires_grad,
        }
    }

    /// Create a 1-D tensor from a vector.
    pub fn from_vec(values: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).expect("1-D shape"), requires_grad)
    }

    /// Create a zero-filled tensor of the given shape.
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Create a scalar (shape `[1]`) tensor.
    pub fn scalar(value: f32, requires_grad: bool) -> Self {
        Self::from_vec(vec![value], requires_grad)
    }

    /// Owned copy of the underlying data.
    pub fn data(&self) -> ArrayD<f32> {
        self.data.borrow().clone()
    }

    /// Borrow the underlying data without copying.
    pub fn data_ref(&self) -> Ref<'_, ArrayD<f32>> {
        self.data.borrow()
    }

    /// Mutable borrow of the underlying data (used by optimizers).
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.data.borrow_mut()
    }

    /// Shape of the tensor.
    pub fn shape(&self) -> Vec<usize> {
        self.data.borrow().shape().to_vec()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether gradients flow into this tensor.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Scalar value of a single-element tensor.
    pub fn item(&self) -> f32 {
        let data = self.data.borrow();
        assert_eq!(data.len(), 1, "item() requires a single-element tensor");
        data.iter().next().copied().unwrap_or(0.0)
    }

    /// True when every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.borrow().iter().all(|v| v.is_finite())
    }

    /// Owned copy of the accumulated gradient, if any.
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.grad.borrow().clone()
    }

    /// Replace the gradient (used to seed the backward pass).
    pub fn set_grad(&self, grad: ArrayD<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add a gradient contribution into this tensor's gradient cell.
    pub fn accumulate_grad(&self, grad: ArrayD<f32>) {
        let mut cell = self.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => {
                assert_eq!(existing.shape(), grad.shape(), "gradient shape mismatch");
                *existing += &grad;
            }
            None => *cell = Some(grad),
        }
    }

    /// Clear the accumulated gradient.
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Shared handle to this tensor's gradient cell.
    pub fn grad_cell(&self) -> Rc<RefCell<Option<ArrayD<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// Attach the op that produced this tensor.
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        *self.backward_op.borrow_mut() = Some(op);
    }

    /// The op that produced this tensor, if it is not a leaf.
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.borrow().clone()
    }

    /// Copy of this tensor detached from the graph: fresh storage, no
    /// gradient, no backward op.
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.data.borrow().clone(), false)
    }

    /// Stable identity of the underlying storage, used to deduplicate graph
    /// nodes during the backward traversal.
    pub fn node_id(&self) -> usize {
        Rc::as_ptr(&self.data) as usize
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.borrow().is_some())
            .finish()
    }
}
