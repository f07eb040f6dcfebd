//! # Approximate policy iteration
//!
//! Every outer iteration runs a block of policy-evaluation updates followed
//! by a block of policy-improvement updates on freshly sampled states. Both
//! networks stay warm between blocks instead of being re-converged.

use crate::agent::ActorCritic;
use crate::config::ExperimentConfig;
use crate::error::RlError;
use crate::sampler::UniformSampler;
use ml::{max_abs_change, Tensor};
use pendulum::Policy;

/// Diagnostics of one outer iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Policy-evaluation objective on the held-out batch after the update.
    pub value_loss: f32,
    /// Policy-improvement objective on the held-out batch after the update.
    pub policy_loss: f32,
    /// Infinity norm of the value parameter change during the iteration.
    pub value_change: f32,
    /// Infinity norm of the policy parameter change during the iteration.
    pub policy_change: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
    pub records: Vec<IterationRecord>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    pub fn value_losses(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.value_loss).collect()
    }

    pub fn policy_losses(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.policy_loss).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.records
            .iter()
            .flat_map(|r| [r.value_loss, r.policy_loss, r.value_change, r.policy_change])
            .all(f32::is_finite)
    }
}

pub struct PolicyIteration {
    pub iterations: usize,
    pub value_steps: usize,
    pub policy_steps: usize,
    pub batch_size: usize,
    pub log_every: usize,
    sampler: UniformSampler,
    test_states: Tensor,
}

impl PolicyIteration {
    /// The held-out batch is drawn once, here, and reused for every
    /// iteration of the experiment.
    pub fn new(config: &ExperimentConfig, state_dim: usize, seed: u64) -> Self {
        let mut sampler = UniformSampler::unit(state_dim, seed);
        let test_states = sampler.sample(config.test_batch_size);
        Self {
            iterations: config.iterations,
            value_steps: config.value_steps,
            policy_steps: config.policy_steps,
            batch_size: config.batch_size,
            log_every: config.log_every,
            sampler,
            test_states,
        }
    }

    pub fn test_states(&self) -> &Tensor {
        &self.test_states
    }

    pub fn run(&mut self, agent: &mut ActorCritic) -> Result<TrainingHistory, RlError> {
        tracing::info!(
            iterations = self.iterations,
            value_steps = self.value_steps,
            policy_steps = self.policy_steps,
            batch_size = self.batch_size,
            "starting approximate policy iteration"
        );
        let mut history = TrainingHistory::default();
        for iteration in 0..self.iterations {
            let record = self.iterate(agent, iteration)?;
            let last = iteration + 1 == self.iterations;
            if self.log_every > 0 && (iteration % self.log_every == 0 || last) {
                tracing::info!(
                    iteration,
                    value_loss = record.value_loss,
                    policy_loss = record.policy_loss,
                    value_change = record.value_change,
                    policy_change = record.policy_change,
                    "policy iteration"
                );
            }
            history.records.push(record);
        }
        Ok(history)
    }

    /// One outer iteration: evaluation block, then improvement block.
    pub fn iterate(
        &mut self,
        agent: &mut ActorCritic,
        iteration: usize,
    ) -> Result<IterationRecord, RlError> {
        let value_before = agent.value.net.snapshot();
        let policy_before = agent.policy.net.snapshot();

        let mut last_value = f32::NAN;
        for _ in 0..self.value_steps {
            let states = self.sampler.sample(self.batch_size);
            last_value = agent.policy_evaluation_step(&states)?.loss;
        }
        tracing::debug!(
            iteration,
            steps = self.value_steps,
            loss = last_value,
            "policy evaluation block"
        );

        let mut last_policy = f32::NAN;
        for _ in 0..self.policy_steps {
            let states = self.sampler.sample(self.batch_size);
            last_policy = agent.policy_improvement_step(&states)?.loss;
        }
        tracing::debug!(
            iteration,
            steps = self.policy_steps,
            loss = last_policy,
            "policy improvement block"
        );

        Ok(IterationRecord {
            iteration,
            value_loss: agent.value_loss(&self.test_states)?,
            policy_loss: agent.policy_loss(&self.test_states)?,
            value_change: max_abs_change(&value_before, &agent.value.net.snapshot()),
            policy_change: max_abs_change(&policy_before, &agent.policy.net.snapshot()),
        })
    }

    /// Trains only the value network, against the Bellman target of a fixed
    /// external policy. Returns the per-step losses.
    pub fn evaluate_fixed_policy(
        &mut self,
        agent: &mut ActorCritic,
        policy: &dyn Policy,
        steps: usize,
    ) -> Result<Vec<f32>, RlError> {
        let mut losses = Vec::with_capacity(steps);
        for _ in 0..steps {
            let states = self.sampler.sample(self.batch_size);
            losses.push(agent.evaluate_fixed_policy_step(policy, &states)?.loss);
        }
        if let Some(loss) = losses.last() {
            tracing::info!(steps, loss, "fixed policy evaluated");
        }
        Ok(losses)
    }

    /// Regresses the value network onto known returns of `states`, the whole
    /// batch per step.
    pub fn fit_to_targets(
        agent: &mut ActorCritic,
        states: &Tensor,
        targets: &Tensor,
        steps: usize,
    ) -> Result<Vec<f32>, RlError> {
        let losses = (0..steps)
            .map(|_| agent.value_regression_step(states, targets).map(|o| o.loss))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(loss) = losses.last() {
            tracing::info!(steps, loss, "value network fitted to rollout returns");
        }
        Ok(losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize, loss: f32) -> IterationRecord {
        IterationRecord {
            iteration: i,
            value_loss: loss,
            policy_loss: -loss,
            value_change: 0.1,
            policy_change: 0.2,
        }
    }

    #[test]
    fn history_accessors() {
        let history = TrainingHistory { records: vec![record(0, 1.0), record(1, 0.5)] };
        assert_eq!(history.len(), 2);
        assert_eq!(history.value_losses(), vec![1.0, 0.5]);
        assert_eq!(history.policy_losses(), vec![-1.0, -0.5]);
        assert_eq!(history.last().map(|r| r.iteration), Some(1));
        assert!(history.is_finite());
    }

    #[test]
    fn non_finite_history_is_detected() {
        let history = TrainingHistory { records: vec![record(0, f32::NAN)] };
        assert!(!history.is_finite());
    }

    #[test]
    fn held_out_batch_has_configured_size() {
        let config = ExperimentConfig { test_batch_size: 17, ..Default::default() };
        let trainer = PolicyIteration::new(&config, 2, 3);
        assert_eq!(trainer.test_states().shape, vec![17, 2]);
    }
}
