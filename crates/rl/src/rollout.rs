use crate::agent::ClosedLoop;
use crate::error::RlError;
use crate::grid::Grid;
use crate::roa::distance;
use ml::{Graph, Tensor};
use pendulum::Reward;
use std::collections::HashMap;

/// Discounted return `sum_t discount^t r(s_t, pi(s_t))` from every grid
/// point, in grid order.
///
/// A trajectory stops accumulating once two consecutive states are within
/// `tolerance` of each other, or after `horizon` rewards.
pub fn reward_rollout(
    grid: &Grid,
    closed_loop: &ClosedLoop<'_>,
    reward: &dyn Reward,
    discount: f32,
    horizon: usize,
    tolerance: f32,
) -> Result<Vec<f32>, RlError> {
    if !(0.0..=1.0).contains(&discount) {
        return Err(RlError::InvalidConfig(format!("discount {discount} outside [0, 1]")));
    }
    let dim = closed_loop.dynamics.state_dim();
    if grid.dim() != dim {
        return Err(RlError::ShapeMismatch {
            context: "rollout grid",
            expected: vec![dim],
            found: vec![grid.dim()],
        });
    }

    let n = grid.len();
    let points = grid.all_points();
    let mut current: Vec<Vec<f32>> = (0..n).map(|i| points.row(i).to_vec()).collect();
    let mut returns = vec![0.0; n];
    let mut active: Vec<usize> = (0..n).collect();
    let mut weight = 1.0f32;

    for _ in 0..horizon {
        if active.is_empty() || weight == 0.0 {
            break;
        }
        let rows: Vec<Vec<f32>> = active.iter().map(|&i| current[i].clone()).collect();
        let states = Tensor::from_rows(&rows, dim);
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let actions = closed_loop.policy.act(&states, &mut g, &mut tensors);
        let rewards = reward.forward(&states, &actions, &mut g, &mut tensors);
        let next = closed_loop.dynamics.forward(&states, &actions, &mut g, &mut tensors);

        for (k, &i) in active.iter().enumerate() {
            returns[i] += weight * rewards.data[k];
        }
        weight *= discount;

        let mut converged = vec![false; n];
        for (k, &i) in active.iter().enumerate() {
            let s = next.row(k).to_vec();
            converged[i] = distance(&s, &current[i]) <= tolerance;
            current[i] = s;
        }
        active.retain(|&i| !converged[i]);
    }

    Ok(returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use pendulum::{LinearPolicy, LinearSystem, QuadraticReward};

    fn scalar_system(a: f32) -> LinearSystem {
        LinearSystem::from_matrices(
            &DMatrix::from_element(1, 1, a),
            &DMatrix::from_element(1, 1, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn geometric_series_for_scalar_system() {
        // x' = 0.5 x, u = 0, r = -x^2, so the return is -x0^2 / (1 - 0.25 * discount).
        let system = scalar_system(0.5);
        let policy = LinearPolicy::new(DMatrix::zeros(1, 1), false);
        let reward =
            QuadraticReward::new(DMatrix::identity(1, 1), DMatrix::identity(1, 1)).unwrap();
        let grid = Grid::new(vec![(-1.0, 1.0)], vec![3]).unwrap();
        let closed_loop = ClosedLoop::new(&system, &policy);
        let values = reward_rollout(&grid, &closed_loop, &reward, 0.9, 200, 0.0).unwrap();
        let expected = -1.0 / (1.0 - 0.25 * 0.9);
        assert!((values[0] - expected).abs() < 1e-4, "{values:?}");
        assert_eq!(values[1], 0.0);
        assert!((values[0] - values[2]).abs() < 1e-6);
    }

    #[test]
    fn converged_trajectories_stop_accumulating() {
        let system = scalar_system(1.0);
        let policy = LinearPolicy::new(DMatrix::zeros(1, 1), false);
        let reward =
            QuadraticReward::new(DMatrix::identity(1, 1), DMatrix::identity(1, 1)).unwrap();
        let grid = Grid::new(vec![(1.0, 1.0)], vec![1]).unwrap();
        // the state never moves, so only the first reward counts
        let closed_loop = ClosedLoop::new(&system, &policy);
        let values = reward_rollout(&grid, &closed_loop, &reward, 1.0, 50, 1e-6).unwrap();
        assert_eq!(values, vec![-1.0]);
    }

    #[test]
    fn mismatched_grid_is_rejected() {
        let system = scalar_system(0.5);
        let policy = LinearPolicy::new(DMatrix::zeros(1, 1), false);
        let reward =
            QuadraticReward::new(DMatrix::identity(1, 1), DMatrix::identity(1, 1)).unwrap();
        let grid = Grid::unit(2, 3).unwrap();
        let closed_loop = ClosedLoop::new(&system, &policy);
        assert!(reward_rollout(&grid, &closed_loop, &reward, 0.9, 10, 0.0).is_err());
    }
}
