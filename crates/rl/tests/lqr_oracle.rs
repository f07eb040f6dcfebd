use anyhow::Result;
use nalgebra::DVector;
use rl::{mask_agreement, reward_rollout, ClosedLoop, Experiment, ExperimentConfig, Grid};

fn linear_config() -> ExperimentConfig {
    ExperimentConfig {
        use_linear_dynamics: true,
        saturate: false,
        policy_layers: vec![8],
        value_layers: vec![8],
        grid_points: 11,
        ..Default::default()
    }
}

#[test]
fn unsaturated_lqr_closed_loop_is_linear() -> Result<()> {
    let exp = Experiment::new(linear_config())?;
    let closed_loop = ClosedLoop::new(exp.agent.dynamics.as_ref(), &exp.baseline);
    let states = exp.grid.all_points();
    let next = closed_loop.step(&states);

    let a_cl = &exp.linear.a - &exp.linear.b * &exp.lqr.gain;
    for k in 0..states.rows() {
        let expected = &a_cl * DVector::from_row_slice(states.row(k));
        for (got, want) in next.row(k).iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-5, "row {k}: {got} vs {want}");
        }
    }
    Ok(())
}

#[test]
fn lqr_rollout_matches_riccati_cost() -> Result<()> {
    let exp = Experiment::new(ExperimentConfig { discount: 0.9999, ..linear_config() })?;
    let grid = Grid::new(vec![(-0.2, 0.2); 2], vec![5, 5])?;
    let closed_loop = ClosedLoop::new(exp.agent.dynamics.as_ref(), &exp.baseline);
    let reward = exp.agent.reward.as_ref();
    let values = reward_rollout(&grid, &closed_loop, reward, 0.9999, 5000, 1e-7)?;

    let p = &exp.lqr.cost;
    for (i, value) in values.iter().enumerate() {
        let x = DVector::from_vec(grid.point(i));
        let oracle = -(x.transpose() * p * &x)[(0, 0)];
        if oracle == 0.0 {
            assert_eq!(*value, 0.0);
            continue;
        }
        let rel = ((value - oracle) / oracle).abs();
        assert!(rel < 0.02, "point {:?}: rollout {value}, -x'Px {oracle}", grid.point(i));
    }
    Ok(())
}

#[test]
fn saturated_lqr_stabilizes_neighbourhood_of_upright() -> Result<()> {
    let exp = Experiment::new(ExperimentConfig { grid_points: 11, ..Default::default() })?;
    let roa = exp.roa(&exp.baseline)?;
    let center = exp.grid.len() / 2;
    assert_eq!(exp.grid.point(center), vec![0.0, 0.0]);
    // immediate neighbours sit at 0.2 in normalized units
    for i in [center - 11, center - 1, center, center + 1, center + 11] {
        assert!(roa.mask[i], "grid point {:?} should be stabilized", exp.grid.point(i));
    }
    assert_eq!(mask_agreement(&roa.mask, &exp.roa(&exp.baseline)?.mask)?, 1.0);
    Ok(())
}
