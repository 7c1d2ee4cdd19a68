//! Serializable tensor state.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shape plus flat row-major data, the on-disk form of every array we
/// persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorState {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorState {
    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(Error::Serialization(format!(
                "tensor state claims shape {:?} ({expected} elements) but carries {}",
                self.shape,
                self.data.len()
            )));
        }
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone())
            .map_err(|e| Error::Serialization(format!("tensor state rebuild failed: {e}")))
    }
}
