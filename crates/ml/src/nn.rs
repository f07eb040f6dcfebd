use crate::recorder::Recorder;
use crate::tensor::Tensor;
use std::collections::HashMap;

/// A fully connected neural network layer.
#[derive(Clone, Debug)]
pub struct Dense {
    /// The weight matrix for the layer, `[out_dim, in_dim]`.
    pub w: Tensor,
    /// The bias vector for the layer.
    pub b: Tensor,
    /// The number of input dimensions.
    pub in_dim: usize,
    /// The number of output dimensions.
    pub out_dim: usize,
}

impl Dense {
    /// Creates a new `Dense` layer with the given weights and biases.
    pub fn new(weights: Vec<f32>, bias: Vec<f32>, in_d: usize, out_d: usize) -> Self {
        assert_eq!(weights.len(), in_d * out_d);
        assert_eq!(bias.len(), out_d);
        Self {
            w: Tensor::from_vec(vec![out_d, in_d], weights).with_grad(),
            b: Tensor::from_vec(vec![out_d], bias).with_grad(),
            in_dim: in_d,
            out_dim: out_d,
        }
    }

    /// Glorot-uniform weights, zero bias.
    pub fn glorot(in_d: usize, out_d: usize, rng: &mut fastrand::Rng) -> Self {
        let limit = (6.0 / (in_d + out_d) as f32).sqrt();
        let weights = (0..in_d * out_d)
            .map(|_| rng.f32() * 2.0 * limit - limit)
            .collect();
        let bias = vec![0.0; out_d];
        Self::new(weights, bias, in_d, out_d)
    }

    /// Performs the forward pass through the layer on a `[n, in_dim]` batch.
    pub fn forward(
        &self,
        x: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let wx = self.w.matmul(x, recorder, tensors);
        wx.add_broadcast(&self.b, recorder, tensors)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Relu,
    Tanh,
}

impl Activation {
    pub fn apply(
        self,
        x: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        match self {
            Activation::Identity => x.clone(),
            Activation::Relu => x.relu(recorder, tensors),
            Activation::Tanh => x.tanh(recorder, tensors),
        }
    }
}

/// A multi-layer perceptron: each dense layer is followed by its activation.
#[derive(Clone, Debug)]
pub struct Mlp {
    layers: Vec<Dense>,
    activations: Vec<Activation>,
}

impl Mlp {
    /// Builds a network taking `input_dim` inputs; `layers` lists the width
    /// and activation of every layer, output layer last.
    pub fn new(input_dim: usize, layers: &[(usize, Activation)], rng: &mut fastrand::Rng) -> Self {
        assert!(!layers.is_empty(), "an Mlp needs at least one layer");
        let mut dense = Vec::with_capacity(layers.len());
        let mut in_d = input_dim;
        for &(out_d, _) in layers {
            dense.push(Dense::glorot(in_d, out_d, rng));
            in_d = out_d;
        }
        Self { layers: dense, activations: layers.iter().map(|&(_, a)| a).collect() }
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim
    }

    pub fn forward(
        &self,
        x: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let mut out = x.clone();
        for (layer, act) in self.layers.iter().zip(&self.activations) {
            let z = layer.forward(&out, recorder, tensors);
            out = act.apply(&z, recorder, tensors);
        }
        out
    }

    pub fn params(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(|l| [&l.w, &l.b]).collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers.iter_mut().flat_map(|l| [&mut l.w, &mut l.b]).collect()
    }

    /// Copies the current parameter values.
    pub fn snapshot(&self) -> Vec<Vec<f32>> {
        self.params().into_iter().map(|p| p.data.clone()).collect()
    }
}

/// Largest absolute entrywise difference between two parameter snapshots.
///
/// NaN as soon as any entry is NaN or infinite in either snapshot, so a
/// diverged network never reads as converged.
pub fn max_abs_change(before: &[Vec<f32>], after: &[Vec<f32>]) -> f32 {
    assert_eq!(before.len(), after.len(), "snapshots of different networks");
    before
        .iter()
        .zip(after)
        .flat_map(|(b, a)| b.iter().zip(a).map(|(x, y)| (x - y).abs()))
        .fold(0.0, |m, d| if m.is_nan() || d.is_nan() { f32::NAN } else { m.max(d) })
}
