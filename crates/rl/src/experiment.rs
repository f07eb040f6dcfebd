use crate::agent::{ActorCritic, ClosedLoop};
use crate::config::ExperimentConfig;
use crate::error::RlError;
use crate::grid::Grid;
use crate::roa::{compute_roa, superlevel_roa, LevelSetRoa, RoaEstimate, RoaOptions};
use crate::rollout::reward_rollout;
use crate::training::{PolicyIteration, TrainingHistory};
use nalgebra::{DMatrix, DVector};
use pendulum::{
    dlqr, Dynamics, InvertedPendulum, LinearPolicy, LinearSystem, Lqr, Policy, QuadraticReward,
};

/// Everything one pendulum run needs, assembled from an [`ExperimentConfig`]:
/// plant and linearization, LQR baseline, the actor-critic context, the
/// evaluation grid and the trainer.
pub struct Experiment {
    pub config: ExperimentConfig,
    pub plant: InvertedPendulum,
    pub linear: LinearSystem,
    pub lqr: Lqr,
    pub baseline: LinearPolicy,
    pub agent: ActorCritic,
    pub grid: Grid,
    pub trainer: PolicyIteration,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Result<Self, RlError> {
        config.validate()?;
        let plant = InvertedPendulum::new(config.pendulum.clone());
        let linear = plant.linearize();

        let q = DMatrix::from_diagonal(&DVector::from_vec(config.state_cost.clone()));
        let r = DMatrix::from_diagonal(&DVector::from_vec(config.action_cost.clone()));
        let lqr = dlqr(&linear.a, &linear.b, &q, &r)?;
        let baseline = LinearPolicy::new(lqr.gain.clone(), config.saturate);
        tracing::info!(gain = ?lqr.gain.as_slice(), "LQR baseline computed");

        let reward = QuadraticReward::new(q, r)?;
        let r_max = reward.max_abs_reward();
        let dynamics: Box<dyn Dynamics> = if config.use_linear_dynamics {
            Box::new(linear.clone())
        } else {
            Box::new(plant.clone())
        };

        let mut rng = fastrand::Rng::with_seed(config.seed);
        let agent = ActorCritic::new(dynamics, Box::new(reward), r_max, &config, &mut rng)?;
        let grid = Grid::unit(agent.dynamics.state_dim(), config.grid_points)?;
        let trainer =
            PolicyIteration::new(&config, agent.dynamics.state_dim(), config.seed.wrapping_add(1));

        Ok(Self { config, plant, linear, lqr, baseline, agent, grid, trainer })
    }

    pub fn train(&mut self) -> Result<TrainingHistory, RlError> {
        self.trainer.run(&mut self.agent)
    }

    /// Trains the value network on the LQR baseline alone.
    pub fn evaluate_baseline(&mut self, steps: usize) -> Result<Vec<f32>, RlError> {
        self.trainer.evaluate_fixed_policy(&mut self.agent, &self.baseline, steps)
    }

    /// Simulated ROA of `policy` on the training dynamics.
    pub fn roa(&self, policy: &dyn Policy) -> Result<RoaEstimate, RlError> {
        let closed_loop = ClosedLoop::new(self.agent.dynamics.as_ref(), policy);
        let options = RoaOptions::new(self.config.horizon, self.config.tolerance);
        compute_roa(&self.grid, |s| closed_loop.step(s), &options)
    }

    /// Discounted rollout return of `policy` from every grid point.
    pub fn rollout_values(&self, policy: &dyn Policy) -> Result<Vec<f32>, RlError> {
        let closed_loop = ClosedLoop::new(self.agent.dynamics.as_ref(), policy);
        reward_rollout(
            &self.grid,
            &closed_loop,
            self.agent.reward.as_ref(),
            self.config.discount,
            self.config.horizon,
            self.config.tolerance,
        )
    }

    /// The value network evaluated on every grid point.
    pub fn grid_values(&self) -> Result<Vec<f32>, RlError> {
        Ok(self.agent.values(&self.grid.all_points())?.data)
    }

    /// Largest superlevel set of the learned value function inside `roa`.
    pub fn implicit_roa(&self, roa: &RoaEstimate) -> Result<LevelSetRoa, RlError> {
        superlevel_roa(&self.grid_values()?, &roa.mask)
    }

    /// Regresses the value network onto the rollout returns of the current
    /// neural policy over the whole grid.
    pub fn fit_value_to_rollout(&mut self, steps: usize) -> Result<Vec<f32>, RlError> {
        let returns = self.rollout_values(&self.agent.policy)?;
        let states = self.grid.all_points();
        let targets = ml::Tensor::from_vec(vec![returns.len(), 1], returns);
        PolicyIteration::fit_to_targets(&mut self.agent, &states, &targets, steps)
    }
}
