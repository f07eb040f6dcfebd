//! # Pendulum dynamics
//!
//! Discrete-time transition functions over normalized state and action
//! batches. Both models are evaluated through the `ml` recorder so that
//! gradients can flow from a next state back into the action that produced
//! it.

use crate::error::PendulumError;
use crate::params::PendulumParams;
use ml::{Graph, Recorder, Tensor};
use nalgebra::DMatrix;
use std::collections::HashMap;

/// Converts a matrix into a row-major `[rows, cols]` tensor.
pub fn tensor_from_matrix(m: &DMatrix<f32>) -> Tensor {
    let data = (0..m.nrows())
        .flat_map(|i| (0..m.ncols()).map(move |j| m[(i, j)]))
        .collect();
    Tensor::from_vec(vec![m.nrows(), m.ncols()], data)
}

fn check_batch(states: &Tensor, actions: &Tensor, state_dim: usize, action_dim: usize) {
    assert_eq!(
        states.cols(),
        state_dim,
        "state batch has {} columns, expected {state_dim}",
        states.cols()
    );
    assert_eq!(
        actions.cols(),
        action_dim,
        "action batch has {} columns, expected {action_dim}",
        actions.cols()
    );
    assert_eq!(states.rows(), actions.rows(), "state and action batches differ in length");
}

/// A deterministic map `(state, action) -> next state`.
pub trait Dynamics {
    fn state_dim(&self) -> usize;
    fn action_dim(&self) -> usize;

    /// Maps `[n, state_dim]` states and `[n, action_dim]` actions to
    /// `[n, state_dim]` next states.
    fn forward(
        &self,
        states: &Tensor,
        actions: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor;

    /// Advances a single state.
    fn step(&self, state: &[f32], action: &[f32]) -> Vec<f32> {
        let s = Tensor::from_vec(vec![1, state.len()], state.to_vec());
        let a = Tensor::from_vec(vec![1, action.len()], action.to_vec());
        self.forward(&s, &a, &mut Graph::new(), &mut HashMap::new()).data
    }
}

/// Nonlinear inverted pendulum, upright at the origin.
///
/// `theta_ddot = g / l * sin(theta) - friction / (m l^2) * theta_dot + u / (m l^2)`,
/// integrated with `substeps` explicit Euler steps per sampling interval.
#[derive(Clone, Debug)]
pub struct InvertedPendulum {
    pub params: PendulumParams,
}

impl InvertedPendulum {
    pub fn new(params: PendulumParams) -> Self {
        Self { params }
    }

    /// Jacobian of the discrete map at the origin, in normalized
    /// coordinates.
    pub fn linearize(&self) -> LinearSystem {
        let p = &self.params;
        let inertia = f64::from(p.inertia());
        let h = f64::from(p.dt) / p.substeps.max(1) as f64;
        let a_c = DMatrix::from_row_slice(
            2,
            2,
            &[
                0.0,
                1.0,
                f64::from(p.gravity) / f64::from(p.length),
                -f64::from(p.friction) / inertia,
            ],
        );
        let b_c = DMatrix::from_row_slice(2, 1, &[0.0, 1.0 / inertia]);

        let euler = DMatrix::<f64>::identity(2, 2) + &a_c * h;
        let input = &b_c * h;
        let mut a = DMatrix::<f64>::identity(2, 2);
        let mut b = DMatrix::<f64>::zeros(2, 1);
        for _ in 0..p.substeps.max(1) {
            b = &euler * &b + &input;
            a = &euler * &a;
        }

        let t_x = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![
            f64::from(p.max_angle),
            f64::from(p.max_angular_velocity),
        ]));
        let t_x_inv = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![
            1.0 / f64::from(p.max_angle),
            1.0 / f64::from(p.max_angular_velocity),
        ]));
        let a_n = &t_x_inv * a * &t_x;
        let b_n = &t_x_inv * b * f64::from(p.max_torque);
        LinearSystem::assemble(a_n.cast::<f32>(), b_n.cast::<f32>())
    }
}

impl Dynamics for InvertedPendulum {
    fn state_dim(&self) -> usize {
        2
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn forward(
        &self,
        states: &Tensor,
        actions: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        check_batch(states, actions, 2, 1);
        let p = &self.params;
        let inertia = p.inertia();
        let h = p.dt / p.substeps.max(1) as f32;

        let mut theta = states
            .column(0, recorder, tensors)
            .mul_scalar(p.max_angle, recorder, tensors);
        let mut omega = states
            .column(1, recorder, tensors)
            .mul_scalar(p.max_angular_velocity, recorder, tensors);
        let drive = actions
            .column(0, recorder, tensors)
            .mul_scalar(p.max_torque / inertia, recorder, tensors);

        for _ in 0..p.substeps.max(1) {
            let mut accel = theta
                .sin(recorder, tensors)
                .mul_scalar(p.gravity / p.length, recorder, tensors)
                .add(&drive, recorder, tensors);
            if p.friction > 0.0 {
                let damping = omega.mul_scalar(p.friction / inertia, recorder, tensors);
                accel = accel.sub(&damping, recorder, tensors);
            }
            let next_theta = theta.add(&omega.mul_scalar(h, recorder, tensors), recorder, tensors);
            omega = omega.add(&accel.mul_scalar(h, recorder, tensors), recorder, tensors);
            theta = next_theta;
        }

        let theta = theta.mul_scalar(1.0 / p.max_angle, recorder, tensors);
        let omega = omega.mul_scalar(1.0 / p.max_angular_velocity, recorder, tensors);
        theta.concat_cols(&omega, recorder, tensors)
    }
}

/// `x' = A x + B u`.
#[derive(Clone, Debug)]
pub struct LinearSystem {
    pub a: DMatrix<f32>,
    pub b: DMatrix<f32>,
    a_t: Tensor,
    b_t: Tensor,
}

impl LinearSystem {
    pub fn from_matrices(a: &DMatrix<f32>, b: &DMatrix<f32>) -> Result<Self, PendulumError> {
        if !a.is_square() || a.nrows() != b.nrows() {
            return Err(PendulumError::DimensionMismatch(format!(
                "A is {}x{}, B is {}x{}",
                a.nrows(),
                a.ncols(),
                b.nrows(),
                b.ncols()
            )));
        }
        Ok(Self::assemble(a.clone(), b.clone()))
    }

    fn assemble(a: DMatrix<f32>, b: DMatrix<f32>) -> Self {
        let (a_t, b_t) = (tensor_from_matrix(&a), tensor_from_matrix(&b));
        Self { a, b, a_t, b_t }
    }
}

impl Dynamics for LinearSystem {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn action_dim(&self) -> usize {
        self.b.ncols()
    }

    fn forward(
        &self,
        states: &Tensor,
        actions: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        check_batch(states, actions, self.state_dim(), self.action_dim());
        let ax = self.a_t.matmul(states, recorder, tensors);
        let bu = self.b_t.matmul(actions, recorder, tensors);
        ax.add(&bu, recorder, tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_an_equilibrium() {
        let pendulum = InvertedPendulum::new(PendulumParams::default());
        assert_eq!(pendulum.step(&[0.0, 0.0], &[0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn gravity_pulls_tilted_pendulum_further_over() {
        let pendulum = InvertedPendulum::new(PendulumParams::default());
        let next = pendulum.step(&[0.5, 0.0], &[0.0]);
        assert!(next[1] > 0.0, "angular velocity should grow in the direction of the tilt");
        let next = pendulum.step(&[-0.5, 0.0], &[0.0]);
        assert!(next[1] < 0.0);
    }

    #[test]
    fn positive_torque_accelerates_positively() {
        let pendulum = InvertedPendulum::new(PendulumParams::default());
        let next = pendulum.step(&[0.0, 0.0], &[1.0]);
        assert!(next[1] > 0.0);
        assert!(next[0] > 0.0);
    }

    #[test]
    fn friction_slows_rotation() {
        let free = InvertedPendulum::new(PendulumParams::default());
        let damped = InvertedPendulum::new(PendulumParams { friction: 0.05, ..Default::default() });
        let a = free.step(&[0.0, 0.5], &[0.0]);
        let b = damped.step(&[0.0, 0.5], &[0.0]);
        assert!(b[1] < a[1]);
    }

    #[test]
    fn linearization_matches_small_perturbations() {
        let pendulum = InvertedPendulum::new(PendulumParams::default());
        let linear = pendulum.linearize();
        let (x, u) = ([1e-3, -2e-3], [5e-4]);
        let exact = pendulum.step(&x, &u);
        let approx = linear.step(&x, &u);
        for (e, a) in exact.iter().zip(&approx) {
            assert!((e - a).abs() < 1e-7, "nonlinear {e} vs linear {a}");
        }
    }

    #[test]
    fn tensor_from_matrix_is_row_major() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = tensor_from_matrix(&m);
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn mismatched_linear_system_is_rejected() {
        let a = DMatrix::<f32>::identity(2, 2);
        let b = DMatrix::<f32>::zeros(3, 1);
        assert!(matches!(
            LinearSystem::from_matrices(&a, &b),
            Err(PendulumError::DimensionMismatch(_))
        ));
    }
}
