//! # Actor-critic context
//!
//! [`ActorCritic`] owns the two parameter sets (policy and value network),
//! their optimizers, and the pure models they are trained against. It
//! exposes side-effect-free evaluation given a state batch, plus the update
//! steps of approximate policy iteration. Each update step mutates exactly
//! one network.

use crate::config::{ExperimentConfig, ObjectiveScaling};
use crate::error::RlError;
use crate::networks::{NeuralPolicy, ValueNetwork};
use ml::{pull_grads, Graph, Optimizer, Recorder, Tape, Tensor};
use pendulum::{Dynamics, Policy, Reward};
use std::collections::HashMap;

/// Result of one gradient step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Objective value before the update.
    pub loss: f32,
    /// Regression target of a value step, `[n, 1]`.
    pub target: Option<Tensor>,
}

/// The dynamics with a policy substituted for the action.
#[derive(Clone, Copy)]
pub struct ClosedLoop<'a> {
    pub dynamics: &'a dyn Dynamics,
    pub policy: &'a dyn Policy,
}

impl<'a> ClosedLoop<'a> {
    pub fn new(dynamics: &'a dyn Dynamics, policy: &'a dyn Policy) -> Self {
        Self { dynamics, policy }
    }

    /// `s' = f(s, pi(s))` for a `[n, state_dim]` batch.
    pub fn step(&self, states: &Tensor) -> Tensor {
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let actions = self.policy.act(states, &mut g, &mut tensors);
        self.dynamics.forward(states, &actions, &mut g, &mut tensors)
    }
}

/// `r(s, pi(s)) + discount * V(f(s, pi(s)))`, as `[n, 1]`.
#[allow(clippy::too_many_arguments)]
fn one_step_return(
    dynamics: &dyn Dynamics,
    reward: &dyn Reward,
    value: &ValueNetwork,
    policy: &dyn Policy,
    states: &Tensor,
    discount: f32,
    recorder: &mut dyn Recorder,
    tensors: &mut HashMap<usize, Tensor>,
) -> Tensor {
    let actions = policy.act(states, recorder, tensors);
    let rewards = reward.forward(states, &actions, recorder, tensors);
    let next = dynamics.forward(states, &actions, recorder, tensors);
    let future = value
        .value(&next, recorder, tensors)
        .mul_scalar(discount, recorder, tensors);
    rewards.add(&future, recorder, tensors)
}

/// `scale * mean |V(s) - target|`.
fn value_objective(
    value: &ValueNetwork,
    states: &Tensor,
    target: &Tensor,
    scale: f32,
    recorder: &mut dyn Recorder,
    tensors: &mut HashMap<usize, Tensor>,
) -> Tensor {
    value
        .value(states, recorder, tensors)
        .sub(target, recorder, tensors)
        .abs(recorder, tensors)
        .reduce_mean(recorder, tensors)
        .mul_scalar(scale, recorder, tensors)
}

fn fit_value(
    value: &mut ValueNetwork,
    optimizer: &mut Optimizer,
    states: &Tensor,
    target: &Tensor,
    scale: f32,
) -> Result<f32, RlError> {
    let mut tape = Tape::new();
    let mut tensors = HashMap::new();
    let loss = value_objective(value, states, target, scale, &mut tape, &mut tensors);
    tape.backward(&loss, &mut tensors)?;
    pull_grads(&mut value.net.params_mut(), &tensors)?;
    optimizer.step(&mut value.net.params_mut())?;
    Ok(loss.data[0])
}

fn warn_if_diverged(kind: &str, loss: f32) {
    if !loss.is_finite() {
        tracing::warn!(kind, loss, "objective is no longer finite");
    }
}

pub struct ActorCritic {
    pub dynamics: Box<dyn Dynamics>,
    pub reward: Box<dyn Reward>,
    pub policy: NeuralPolicy,
    pub value: ValueNetwork,
    policy_optimizer: Optimizer,
    value_optimizer: Optimizer,
    pub discount: f32,
    /// Largest per-step `|reward|` over the normalized domain.
    pub r_max: f32,
    pub value_scaling: ObjectiveScaling,
    pub policy_scaling: ObjectiveScaling,
}

impl ActorCritic {
    pub fn new(
        dynamics: Box<dyn Dynamics>,
        reward: Box<dyn Reward>,
        r_max: f32,
        config: &ExperimentConfig,
        rng: &mut fastrand::Rng,
    ) -> Result<Self, RlError> {
        if !(r_max.is_finite() && r_max > 0.0) {
            return Err(RlError::InvalidConfig(format!(
                "maximum reward magnitude {r_max} must be positive"
            )));
        }
        let state_dim = dynamics.state_dim();
        let policy_spec = config.policy_spec(dynamics.action_dim());
        let policy = NeuralPolicy::new(state_dim, &policy_spec, config.saturate, rng);
        let value = ValueNetwork::new(state_dim, &config.value_spec(), rng);
        Ok(Self {
            dynamics,
            reward,
            policy,
            value,
            policy_optimizer: config.optimizer.build(config.policy_learning_rate),
            value_optimizer: config.optimizer.build(config.value_learning_rate),
            discount: config.discount,
            r_max,
            value_scaling: config.value_scaling,
            policy_scaling: config.policy_scaling,
        })
    }

    fn check_states(&self, states: &Tensor) -> Result<(), RlError> {
        let dim = self.dynamics.state_dim();
        if states.shape.len() != 2 || states.cols() != dim {
            return Err(RlError::ShapeMismatch {
                context: "state batch",
                expected: vec![states.rows(), dim],
                found: states.shape.clone(),
            });
        }
        Ok(())
    }

    pub fn value_scale(&self) -> f32 {
        self.value_scaling.factor(self.discount, self.r_max)
    }

    pub fn policy_scale(&self) -> f32 {
        self.policy_scaling.factor(self.discount, self.r_max)
    }

    pub fn closed_loop(&self) -> ClosedLoop<'_> {
        ClosedLoop::new(self.dynamics.as_ref(), &self.policy)
    }

    pub fn actions(&self, states: &Tensor) -> Result<Tensor, RlError> {
        self.check_states(states)?;
        Ok(self.policy.act(states, &mut Graph::new(), &mut HashMap::new()))
    }

    pub fn values(&self, states: &Tensor) -> Result<Tensor, RlError> {
        self.check_states(states)?;
        Ok(self.value.value(states, &mut Graph::new(), &mut HashMap::new()))
    }

    /// One-step Bellman target under `policy`, detached from every parameter.
    pub fn bellman_target(&self, policy: &dyn Policy, states: &Tensor) -> Result<Tensor, RlError> {
        self.check_states(states)?;
        let target = one_step_return(
            self.dynamics.as_ref(),
            self.reward.as_ref(),
            &self.value,
            policy,
            states,
            self.discount,
            &mut Graph::new(),
            &mut HashMap::new(),
        );
        Ok(target.detach())
    }

    /// Policy-evaluation objective on `states` without updating anything.
    pub fn value_loss(&self, states: &Tensor) -> Result<f32, RlError> {
        let target = self.bellman_target(&self.policy, states)?;
        let loss = value_objective(
            &self.value,
            states,
            &target,
            self.value_scale(),
            &mut Graph::new(),
            &mut HashMap::new(),
        );
        Ok(loss.data[0])
    }

    /// Policy-improvement objective on `states` without updating anything.
    pub fn policy_loss(&self, states: &Tensor) -> Result<f32, RlError> {
        self.check_states(states)?;
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let ret = one_step_return(
            self.dynamics.as_ref(),
            self.reward.as_ref(),
            &self.value,
            &self.policy,
            states,
            self.discount,
            &mut g,
            &mut tensors,
        );
        Ok(-self.policy_scale() * ret.reduce_mean(&mut g, &mut tensors).data[0])
    }

    /// One gradient step of the value network towards the Bellman target of
    /// the current neural policy.
    pub fn policy_evaluation_step(&mut self, states: &Tensor) -> Result<StepOutcome, RlError> {
        let target = self.bellman_target(&self.policy, states)?;
        self.value_step_towards(states, target)
    }

    /// Like [`Self::policy_evaluation_step`] for an externally fixed policy,
    /// e.g. the LQR baseline.
    pub fn evaluate_fixed_policy_step(
        &mut self,
        policy: &dyn Policy,
        states: &Tensor,
    ) -> Result<StepOutcome, RlError> {
        let target = self.bellman_target(policy, states)?;
        self.value_step_towards(states, target)
    }

    /// Supervised regression of the value network onto given targets, such
    /// as discounted rollout returns.
    pub fn value_regression_step(
        &mut self,
        states: &Tensor,
        targets: &Tensor,
    ) -> Result<StepOutcome, RlError> {
        self.check_states(states)?;
        if targets.len() != states.rows() {
            return Err(RlError::ShapeMismatch {
                context: "regression targets",
                expected: vec![states.rows(), 1],
                found: targets.shape.clone(),
            });
        }
        let target = Tensor::from_vec(vec![states.rows(), 1], targets.data.clone());
        self.value_step_towards(states, target)
    }

    fn value_step_towards(
        &mut self,
        states: &Tensor,
        target: Tensor,
    ) -> Result<StepOutcome, RlError> {
        let scale = self.value_scale();
        let loss = fit_value(&mut self.value, &mut self.value_optimizer, states, &target, scale)?;
        warn_if_diverged("value", loss);
        Ok(StepOutcome { loss, target: Some(target) })
    }

    /// One gradient step of the policy network maximizing the one-step
    /// return through both the reward and the dynamics-then-value path.
    pub fn policy_improvement_step(&mut self, states: &Tensor) -> Result<StepOutcome, RlError> {
        self.check_states(states)?;
        let mut tape = Tape::new();
        let mut tensors = HashMap::new();
        let ret = one_step_return(
            self.dynamics.as_ref(),
            self.reward.as_ref(),
            &self.value,
            &self.policy,
            states,
            self.discount,
            &mut tape,
            &mut tensors,
        );
        let loss = ret
            .reduce_mean(&mut tape, &mut tensors)
            .mul_scalar(-self.policy_scale(), &mut tape, &mut tensors);
        tape.backward(&loss, &mut tensors)?;
        pull_grads(&mut self.policy.net.params_mut(), &tensors)?;
        self.policy_optimizer.step(&mut self.policy.net.params_mut())?;
        warn_if_diverged("policy", loss.data[0]);
        Ok(StepOutcome { loss: loss.data[0], target: None })
    }
}
