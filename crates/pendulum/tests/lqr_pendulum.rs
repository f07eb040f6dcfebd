use ml::{Graph, Tape, Tensor};
use nalgebra::DMatrix;
use pendulum::{dlqr, Dynamics, InvertedPendulum, LinearPolicy, PendulumParams, Policy};
use std::collections::HashMap;

fn lqr_for_default_pendulum() -> (InvertedPendulum, pendulum::LinearSystem, pendulum::Lqr) {
    let plant = InvertedPendulum::new(PendulumParams::default());
    let linear = plant.linearize();
    let (q, r) = (DMatrix::identity(2, 2), DMatrix::from_element(1, 1, 0.1));
    let lqr = dlqr(&linear.a, &linear.b, &q, &r).unwrap();
    (plant, linear, lqr)
}

#[test]
fn lqr_stabilizes_nonlinear_pendulum_near_upright() {
    let (plant, _, lqr) = lqr_for_default_pendulum();
    let policy = LinearPolicy::new(lqr.gain.clone(), true);
    let mut state = vec![0.3, -0.2];
    for _ in 0..3000 {
        let action = policy.action(&state);
        state = plant.step(&state, &action);
    }
    let norm = (state[0].powi(2) + state[1].powi(2)).sqrt();
    assert!(norm < 1e-3, "pendulum did not settle: {state:?}");
}

#[test]
fn unforced_pendulum_falls() {
    let (plant, _, _) = lqr_for_default_pendulum();
    let mut state = vec![0.05, 0.0];
    for _ in 0..200 {
        state = plant.step(&state, &[0.0]);
    }
    assert!(state[0] > 0.5, "pendulum should have tipped over, state {state:?}");
}

#[test]
fn dynamics_gradient_matches_finite_difference() {
    let plant = InvertedPendulum::new(PendulumParams { friction: 0.02, ..Default::default() });
    let states = Tensor::from_vec(vec![2, 2], vec![0.6, -0.3, -0.9, 0.8]);
    let actions = Tensor::from_vec(vec![2, 1], vec![0.4, -0.7]).with_grad();

    let mut tape = Tape::new();
    let mut tensors = HashMap::new();
    let next = plant.forward(&states, &actions, &mut tape, &mut tensors);
    let loss = next.reduce_sum(&mut tape, &mut tensors);
    tape.backward(&loss, &mut tensors).unwrap();
    let analytic = tensors[&actions.id].grad.clone().unwrap();

    let eps = 1e-2;
    for i in 0..actions.len() {
        let mut plus = actions.clone();
        let mut minus = actions.clone();
        plus.data[i] += eps;
        minus.data[i] -= eps;
        let f = |a: &Tensor| {
            plant
                .forward(&states, a, &mut Graph::new(), &mut HashMap::new())
                .data
                .iter()
                .sum::<f32>()
        };
        let numeric = (f(&plus) - f(&minus)) / (2.0 * eps);
        assert!(
            (numeric - analytic[i]).abs() < 1e-3,
            "action {i}: numeric {numeric}, analytic {}",
            analytic[i]
        );
    }
}

#[test]
fn lqr_cost_matrix_is_symmetric_positive_definite() {
    let (_, _, lqr) = lqr_for_default_pendulum();
    let p = lqr.cost.cast::<f64>();
    assert!((p[(0, 1)] - p[(1, 0)]).abs() < 1e-3 * p.abs().max());
    assert!(p[(0, 0)] > 0.0 && p.determinant() > 0.0);
}
