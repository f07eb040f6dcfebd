use crate::error::RlError;
use ml::{Activation, Adam, Optimizer, Sgd};
use pendulum::PendulumParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Normalization applied to both training objectives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveScaling {
    /// `(1 - discount) / r_max`: keeps the loss magnitude comparable across
    /// discount factors, since values scale like `r_max / (1 - discount)`.
    Discounted,
    /// `1 / r_max`.
    Unit,
}

impl ObjectiveScaling {
    pub fn factor(self, discount: f32, r_max: f32) -> f32 {
        match self {
            ObjectiveScaling::Discounted => (1.0 - discount) / r_max,
            ObjectiveScaling::Unit => 1.0 / r_max,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f32) -> Optimizer {
        match self {
            OptimizerKind::Sgd => Optimizer::Sgd(Sgd::new(learning_rate)),
            OptimizerKind::Adam => Optimizer::Adam(Adam::new(learning_rate)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenActivation {
    Relu,
    Tanh,
}

impl From<HiddenActivation> for Activation {
    fn from(a: HiddenActivation) -> Self {
        match a {
            HiddenActivation::Relu => Activation::Relu,
            HiddenActivation::Tanh => Activation::Tanh,
        }
    }
}

/// Every tunable of one approximate policy iteration experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Discount factor in `[0, 1]`
    pub discount: f32,
    pub value_learning_rate: f32,
    pub policy_learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// States drawn per gradient step
    pub batch_size: usize,
    /// Size of the held-out batch used for the per-iteration test losses
    pub test_batch_size: usize,
    /// Outer policy iteration count
    pub iterations: usize,
    /// Policy-evaluation updates per outer iteration
    pub value_steps: usize,
    /// Policy-improvement updates per outer iteration
    pub policy_steps: usize,
    /// Maximum simulated steps per grid point
    pub horizon: usize,
    /// Convergence radius for ROA and rollout estimation
    pub tolerance: f32,
    /// Clip policy outputs to the action bounds
    pub saturate: bool,
    /// Train against the linearized instead of the nonlinear pendulum
    pub use_linear_dynamics: bool,
    pub value_scaling: ObjectiveScaling,
    pub policy_scaling: ObjectiveScaling,
    pub hidden_activation: HiddenActivation,
    /// Hidden layer widths of the policy network
    pub policy_layers: Vec<usize>,
    /// Hidden layer widths of the value network
    pub value_layers: Vec<usize>,
    /// Grid points per state dimension
    pub grid_points: usize,
    /// Diagonal of the state cost `Q`
    pub state_cost: Vec<f32>,
    /// Diagonal of the action cost `R`
    pub action_cost: Vec<f32>,
    pub seed: u64,
    /// Log every n-th outer iteration
    pub log_every: usize,
    pub pendulum: PendulumParams,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            discount: 0.98,
            value_learning_rate: 1e-3,
            policy_learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            batch_size: 256,
            test_batch_size: 1000,
            iterations: 200,
            value_steps: 10,
            policy_steps: 1,
            horizon: 500,
            tolerance: 1e-2,
            saturate: true,
            use_linear_dynamics: false,
            value_scaling: ObjectiveScaling::Discounted,
            policy_scaling: ObjectiveScaling::Discounted,
            hidden_activation: HiddenActivation::Relu,
            policy_layers: vec![32, 32],
            value_layers: vec![64, 64],
            grid_points: 51,
            state_cost: vec![1.0, 1.0],
            action_cost: vec![0.1],
            seed: 0,
            log_every: 10,
            pendulum: PendulumParams::default(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> RlError {
    RlError::InvalidConfig(msg.into())
}

impl ExperimentConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RlError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RlError> {
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(invalid(format!("discount {} outside [0, 1]", self.discount)));
        }
        let discounted =
            [self.value_scaling, self.policy_scaling].contains(&ObjectiveScaling::Discounted);
        if discounted && self.discount >= 1.0 {
            return Err(invalid("discounted objective scaling needs discount < 1"));
        }
        let rates = [("value", self.value_learning_rate), ("policy", self.policy_learning_rate)];
        for (name, lr) in rates {
            if !lr.is_finite() || lr < 0.0 {
                return Err(invalid(format!(
                    "{name} learning rate {lr} must be finite and non-negative"
                )));
            }
        }
        if self.batch_size == 0 || self.test_batch_size == 0 {
            return Err(invalid("batch sizes must be positive"));
        }
        if self.horizon == 0 {
            return Err(invalid("horizon must be at least 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(invalid(format!(
                "tolerance {} must be finite and non-negative",
                self.tolerance
            )));
        }
        if self.grid_points < 2 {
            return Err(invalid("grid needs at least two points per dimension"));
        }
        if self.policy_layers.contains(&0) || self.value_layers.contains(&0) {
            return Err(invalid("layer widths must be positive"));
        }
        if self.state_cost.len() != 2 || self.action_cost.len() != 1 {
            return Err(invalid("state_cost needs 2 entries and action_cost 1"));
        }
        if self.state_cost.iter().chain(&self.action_cost).any(|c| !c.is_finite() || *c < 0.0) {
            return Err(invalid("cost weights must be finite and non-negative"));
        }
        if self.state_cost.iter().chain(&self.action_cost).all(|c| *c == 0.0) {
            return Err(invalid("at least one cost weight must be positive"));
        }
        let p = &self.pendulum;
        let physical = [p.mass, p.length, p.dt, p.max_angle, p.max_angular_velocity, p.max_torque];
        let bad_physical = physical.iter().any(|v| !v.is_finite() || *v <= 0.0);
        if bad_physical || p.friction < 0.0 || p.substeps == 0 {
            return Err(invalid("pendulum parameters must be positive"));
        }
        Ok(())
    }

    /// Layer specification of the policy network, linear output last.
    pub fn policy_spec(&self, action_dim: usize) -> Vec<(usize, Activation)> {
        layer_spec(&self.policy_layers, self.hidden_activation.into(), action_dim)
    }

    /// Layer specification of the value network, linear output last.
    pub fn value_spec(&self) -> Vec<(usize, Activation)> {
        layer_spec(&self.value_layers, self.hidden_activation.into(), 1)
    }
}

fn layer_spec(hidden: &[usize], activation: Activation, out: usize) -> Vec<(usize, Activation)> {
    hidden
        .iter()
        .map(|&w| (w, activation))
        .chain(std::iter::once((out, Activation::Identity)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ExperimentConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(
                r#"{ "discount": 0.9, "optimizer": "sgd", "pendulum": { "friction": 0.01 } }"#,
            )
                .unwrap();
        assert_eq!(config.discount, 0.9);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.pendulum.friction, 0.01);
        assert_eq!(config.pendulum.mass, PendulumParams::default().mass);
        assert_eq!(config.batch_size, ExperimentConfig::default().batch_size);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            ExperimentConfig { discount: 1.5, ..Default::default() },
            ExperimentConfig { discount: 1.0, ..Default::default() },
            ExperimentConfig { batch_size: 0, ..Default::default() },
            ExperimentConfig { horizon: 0, ..Default::default() },
            ExperimentConfig { value_learning_rate: -1.0, ..Default::default() },
            ExperimentConfig { state_cost: vec![1.0], ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(RlError::InvalidConfig(_))), "{config:?}");
        }
    }

    #[test]
    fn undiscounted_run_is_allowed_with_unit_scaling() {
        let config = ExperimentConfig {
            discount: 1.0,
            value_scaling: ObjectiveScaling::Unit,
            policy_scaling: ObjectiveScaling::Unit,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn scaling_factors() {
        assert!((ObjectiveScaling::Discounted.factor(0.9, 2.0) - 0.05).abs() < 1e-7);
        assert_eq!(ObjectiveScaling::Unit.factor(0.9, 2.0), 0.5);
    }

    #[test]
    fn specs_end_with_linear_scalar_output() {
        let spec = ExperimentConfig::default().value_spec();
        assert_eq!(spec.len(), 3);
        assert_eq!(spec[2], (1, Activation::Identity));
    }
}
