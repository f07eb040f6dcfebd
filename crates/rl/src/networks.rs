use ml::{Activation, Mlp, Recorder, Tensor};
use pendulum::{saturate, Policy};
use std::collections::HashMap;

/// Parametric policy `state -> action`, clipped to the action bounds when
/// `saturate` is set.
#[derive(Clone, Debug)]
pub struct NeuralPolicy {
    pub net: Mlp,
    pub saturate: bool,
}

impl NeuralPolicy {
    pub fn new(
        state_dim: usize,
        layers: &[(usize, Activation)],
        saturate: bool,
        rng: &mut fastrand::Rng,
    ) -> Self {
        Self { net: Mlp::new(state_dim, layers, rng), saturate }
    }
}

impl Policy for NeuralPolicy {
    fn act(
        &self,
        states: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let raw = self.net.forward(states, recorder, tensors);
        saturate(raw, self.saturate, recorder, tensors)
    }
}

/// Parametric value function `state -> scalar`.
#[derive(Clone, Debug)]
pub struct ValueNetwork {
    pub net: Mlp,
}

impl ValueNetwork {
    pub fn new(state_dim: usize, layers: &[(usize, Activation)], rng: &mut fastrand::Rng) -> Self {
        let net = Mlp::new(state_dim, layers, rng);
        assert_eq!(net.output_dim(), 1, "value network must have a scalar output");
        Self { net }
    }

    /// `[n, state_dim]` states to `[n, 1]` values.
    pub fn value(
        &self,
        states: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        self.net.forward(states, recorder, tensors)
    }
}
