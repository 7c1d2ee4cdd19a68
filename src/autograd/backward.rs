//! Reverse-mode gradient propagation

use std::collections::HashSet;

use ndarray::ArrayD;

use super::Tensor;

/// A node's contribution to the backward pass.
///
/// `backward()` reads the accumulated gradient of the op's output and pushes
/// gradient contributions into the op's inputs. It must not recurse: the
/// driver in [`backward`] walks the graph in reverse topological order and
/// invokes each op exactly once, after all of its consumers have run. This
/// keeps gradients correct when an intermediate tensor feeds several ops
/// (pyramids, shift products).
pub trait BackwardOp {
    /// Push gradients from the output into the inputs.
    fn backward(&self);

    /// Graph edges: the tensors this op consumed.
    fn inputs(&self) -> Vec<Tensor>;
}

/// Run the backward pass from a scalar (or any) loss tensor.
///
/// Seeds the loss gradient with ones, then visits every op exactly once in
/// reverse topological order, deduplicating nodes by storage identity.
pub fn backward(loss: &Tensor) {
    let seed = ArrayD::ones(loss.data_ref().raw_dim());
    loss.set_grad(seed);

    let mut visited: HashSet<usize> = HashSet::new();
    let mut order: Vec<std::rc::Rc<dyn BackwardOp>> = Vec::new();
    collect(loss, &mut visited, &mut order);

    for op in order.iter().rev() {
        op.backward();
    }
}

/// Post-order DFS: a node's op is pushed after the ops of everything it
/// consumed, so the reversed list runs consumers before producers.
fn collect(
    tensor: &Tensor,
    visited: &mut HashSet<usize>,
    order: &mut Vec<std::rc::Rc<dyn BackwardOp>>,
) {
    if !visited.insert(tensor.node_id()) {
        return;
    }
    if let Some(op) = tensor.backward_op() {
        for input in op.inputs() {
            collect(&input, visited, order);
        }
        order.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::ops::{add, mul, scale};

    #[test]
    fn test_backward_linear_chain() {
        // y = 3 * (a + a') where a' aliases a via clone
        let a = Tensor::from_vec(vec![2.0], true);
        let y = scale(&add(&a, &a), 3.0);
        backward(&y);
        // dy/da = 3 + 3 = 6
        let g = a.grad().expect("grad");
        assert_eq!(g[[0]], 6.0);
    }

    #[test]
    fn test_backward_shared_intermediate() {
        // s = a * 2; y = s * s  => dy/da = 2 * s * ds/da = 2 * 2a * 2 = 8a
        let a = Tensor::from_vec(vec![3.0], true);
        let s = scale(&a, 2.0);
        let y = mul(&s, &s);
        backward(&y);
        let g = a.grad().expect("grad");
        assert_eq!(g[[0]], 8.0 * 3.0);
    }

    #[test]
    fn test_backward_runs_each_op_once() {
        // A diamond: s feeds two consumers whose results are added. The
        // re-entrant recursive scheme would over-count here.
        let a = Tensor::from_vec(vec![1.0], true);
        let s = scale(&a, 2.0);
        let left = scale(&s, 3.0);
        let right = scale(&s, 5.0);
        let y = add(&left, &right);
        backward(&y);
        // dy/da = (3 + 5) * 2 = 16
        let g = a.grad().expect("grad");
        assert_eq!(g[[0]], 16.0);
    }
}
