use crate::dynamics::tensor_from_matrix;
use ml::{Graph, Recorder, Tensor};
use nalgebra::DMatrix;
use std::collections::HashMap;

/// Lower and upper bound of every normalized action component.
pub const ACTION_BOUNDS: (f32, f32) = (-1.0, 1.0);

/// A feedback law `state -> action`.
pub trait Policy {
    /// Maps `[n, state_dim]` states to `[n, action_dim]` actions.
    fn act(
        &self,
        states: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor;

    fn action(&self, state: &[f32]) -> Vec<f32> {
        let s = Tensor::from_vec(vec![1, state.len()], state.to_vec());
        self.act(&s, &mut Graph::new(), &mut HashMap::new()).data
    }
}

/// Clips actions into [`ACTION_BOUNDS`] when `saturate` is set.
pub fn saturate(
    actions: Tensor,
    saturate: bool,
    recorder: &mut dyn Recorder,
    tensors: &mut HashMap<usize, Tensor>,
) -> Tensor {
    if saturate {
        actions.clamp(ACTION_BOUNDS.0, ACTION_BOUNDS.1, recorder, tensors)
    } else {
        actions
    }
}

/// `u = -K x`, optionally clipped.
#[derive(Clone, Debug)]
pub struct LinearPolicy {
    pub gain: DMatrix<f32>,
    pub saturate: bool,
    neg_gain: Tensor,
}

impl LinearPolicy {
    pub fn new(gain: DMatrix<f32>, saturate: bool) -> Self {
        let neg_gain = tensor_from_matrix(&(-&gain));
        Self { gain, saturate, neg_gain }
    }
}

impl Policy for LinearPolicy {
    fn act(
        &self,
        states: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let u = self.neg_gain.matmul(states, recorder, tensors);
        saturate(u, self.saturate, recorder, tensors)
    }
}
