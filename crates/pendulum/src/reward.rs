use crate::dynamics::tensor_from_matrix;
use crate::error::PendulumError;
use ml::{Graph, Recorder, Tensor};
use nalgebra::DMatrix;
use std::collections::HashMap;

/// A deterministic per-step reward over state-action pairs.
pub trait Reward {
    /// Maps `[n, state_dim]` states and `[n, action_dim]` actions to `[n, 1]`
    /// rewards.
    fn forward(
        &self,
        states: &Tensor,
        actions: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor;

    fn evaluate(&self, state: &[f32], action: &[f32]) -> f32 {
        let s = Tensor::from_vec(vec![1, state.len()], state.to_vec());
        let a = Tensor::from_vec(vec![1, action.len()], action.to_vec());
        self.forward(&s, &a, &mut Graph::new(), &mut HashMap::new()).data[0]
    }
}

/// `r(x, u) = -(x^T Q x + u^T R u)`.
#[derive(Clone, Debug)]
pub struct QuadraticReward {
    pub q: DMatrix<f32>,
    pub r: DMatrix<f32>,
    q_t: Tensor,
    r_t: Tensor,
}

impl QuadraticReward {
    pub fn new(q: DMatrix<f32>, r: DMatrix<f32>) -> Result<Self, PendulumError> {
        if !q.is_square() || !r.is_square() {
            return Err(PendulumError::DimensionMismatch(format!(
                "cost matrices must be square, got Q {}x{} and R {}x{}",
                q.nrows(),
                q.ncols(),
                r.nrows(),
                r.ncols()
            )));
        }
        let (q_t, r_t) = (tensor_from_matrix(&q), tensor_from_matrix(&r));
        Ok(Self { q, r, q_t, r_t })
    }

    /// Largest `|r|` over the normalized box `[-1, 1]^(n + m)`. The cost is
    /// a convex quadratic, so it peaks at a corner.
    pub fn max_abs_reward(&self) -> f32 {
        let (n, m) = (self.q.nrows(), self.r.nrows());
        let dims = n + m;
        let mut states = Vec::new();
        let mut actions = Vec::new();
        for mask in 0..(1usize << dims) {
            let corner: Vec<f32> = (0..dims)
                .map(|d| if mask & (1 << d) == 0 { -1.0 } else { 1.0 })
                .collect();
            states.extend_from_slice(&corner[..n]);
            actions.extend_from_slice(&corner[n..]);
        }
        let count = 1usize << dims;
        let s = Tensor::from_vec(vec![count, n], states);
        let a = Tensor::from_vec(vec![count, m], actions);
        let r = self.forward(&s, &a, &mut Graph::new(), &mut HashMap::new());
        r.data.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }
}

impl Reward for QuadraticReward {
    fn forward(
        &self,
        states: &Tensor,
        actions: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        assert_eq!(states.rows(), actions.rows(), "state and action batches differ in length");
        let state_cost = self
            .q_t
            .matmul(states, recorder, tensors)
            .mul(states, recorder, tensors)
            .sum_cols(recorder, tensors);
        let action_cost = self
            .r_t
            .matmul(actions, recorder, tensors)
            .mul(actions, recorder, tensors)
            .sum_cols(recorder, tensors);
        state_cost
            .add(&action_cost, recorder, tensors)
            .mul_scalar(-1.0, recorder, tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward() -> QuadraticReward {
        QuadraticReward::new(DMatrix::identity(2, 2), DMatrix::from_element(1, 1, 0.1)).unwrap()
    }

    #[test]
    fn reward_is_negative_quadratic_cost() {
        let r = reward();
        assert_eq!(r.evaluate(&[0.0, 0.0], &[0.0]), 0.0);
        assert!((r.evaluate(&[0.5, -1.0], &[1.0]) + (0.25 + 1.0 + 0.1)).abs() < 1e-6);
    }

    #[test]
    fn max_abs_reward_is_attained_at_corner() {
        assert!((reward().max_abs_reward() - 2.1).abs() < 1e-6);
    }

    #[test]
    fn non_square_costs_are_rejected() {
        let bad = QuadraticReward::new(DMatrix::zeros(2, 1), DMatrix::identity(1, 1));
        assert!(bad.is_err());
    }
}
