use crate::error::MlError;
use crate::graph::{EOp, Node};
use crate::recorder::Recorder;
use crate::tensor::Tensor;
use std::collections::HashMap;

/// A tape that records operations for automatic differentiation.
#[derive(Default)]
pub struct Tape {
    nodes: Vec<Node>,
}

impl Recorder for Tape {
    fn record(&mut self, node: Node) {
        self.nodes.push(node);
    }

    fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

fn lookup(tensors: &HashMap<usize, Tensor>, id: usize) -> Result<&Tensor, MlError> {
    tensors.get(&id).ok_or(MlError::MissingTensor(id))
}

fn slot<'g>(grads: &'g mut HashMap<usize, Vec<f32>>, t: &Tensor) -> &'g mut Vec<f32> {
    grads.entry(t.id).or_insert_with(|| vec![0.0; t.len()])
}

impl Tape {
    /// Creates a new, empty tape.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Computes the gradients of the tensors on the tape with respect to a loss tensor.
    ///
    /// The recorded operations are traversed in reverse order. Nodes that do
    /// not lie on a path to `loss` are skipped. Every tensor in `tensors`
    /// flagged `requires_grad` receives its accumulated gradient.
    pub fn backward(
        &self,
        loss: &Tensor,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Result<(), MlError> {
        let mut grads: HashMap<usize, Vec<f32>> = HashMap::new();
        grads.insert(loss.id, vec![1.0; loss.len()]);

        for node in self.nodes.iter().rev() {
            let Some(out_grad) = grads.get(&node.out).cloned() else {
                continue;
            };
            let a = lookup(tensors, node.a)?;
            let b = lookup(tensors, node.b)?;

            match node.op {
                EOp::Add => {
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                    for (g, og) in slot(&mut grads, b).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                }
                EOp::Sub => {
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                    for (g, og) in slot(&mut grads, b).iter_mut().zip(&out_grad) {
                        *g -= og;
                    }
                }
                EOp::Mul => {
                    for (g, (d, og)) in slot(&mut grads, a)
                        .iter_mut()
                        .zip(b.data.iter().zip(&out_grad))
                    {
                        *g += d * og;
                    }
                    for (g, (d, og)) in slot(&mut grads, b)
                        .iter_mut()
                        .zip(a.data.iter().zip(&out_grad))
                    {
                        *g += d * og;
                    }
                }
                EOp::MulScalar => {
                    let scalar = b.data[0];
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += scalar * og;
                    }
                }
                EOp::MatMul => {
                    let out_dim = a.shape[0];
                    let in_dim = a.shape[1];
                    let batch_size = b.rows();
                    {
                        let w_grad = slot(&mut grads, a);
                        for i in 0..out_dim {
                            for j in 0..in_dim {
                                for k in 0..batch_size {
                                    w_grad[i * in_dim + j] +=
                                        out_grad[k * out_dim + i] * b.data[k * in_dim + j];
                                }
                            }
                        }
                    }
                    {
                        let x_grad = slot(&mut grads, b);
                        for k in 0..batch_size {
                            for j in 0..in_dim {
                                for i in 0..out_dim {
                                    x_grad[k * in_dim + j] +=
                                        out_grad[k * out_dim + i] * a.data[i * in_dim + j];
                                }
                            }
                        }
                    }
                }
                EOp::AddBroadcast => {
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                    let dim = a.cols();
                    let b_grad = slot(&mut grads, b);
                    for (idx, og) in out_grad.iter().enumerate() {
                        b_grad[idx % dim] += og;
                    }
                }
                EOp::Tanh => {
                    let out = lookup(tensors, node.out)?;
                    for (g, (d, og)) in slot(&mut grads, a)
                        .iter_mut()
                        .zip(out.data.iter().zip(&out_grad))
                    {
                        *g += (1.0 - d.powi(2)) * og;
                    }
                }
                EOp::Relu => {
                    for (g, (d, og)) in slot(&mut grads, a)
                        .iter_mut()
                        .zip(a.data.iter().zip(&out_grad))
                    {
                        if *d > 0.0 {
                            *g += og;
                        }
                    }
                }
                EOp::Sin => {
                    for (g, (d, og)) in slot(&mut grads, a)
                        .iter_mut()
                        .zip(a.data.iter().zip(&out_grad))
                    {
                        *g += d.cos() * og;
                    }
                }
                EOp::Abs => {
                    for (g, (d, og)) in slot(&mut grads, a)
                        .iter_mut()
                        .zip(a.data.iter().zip(&out_grad))
                    {
                        if *d > 0.0 {
                            *g += og;
                        } else if *d < 0.0 {
                            *g -= og;
                        }
                    }
                }
                EOp::Clamp => {
                    let (min, max) = (b.data[0], b.data[1]);
                    for (g, (d, og)) in slot(&mut grads, a)
                        .iter_mut()
                        .zip(a.data.iter().zip(&out_grad))
                    {
                        if *d > min && *d < max {
                            *g += og;
                        }
                    }
                }
                EOp::Column(j) => {
                    let cols = a.cols();
                    let a_grad = slot(&mut grads, a);
                    for (k, og) in out_grad.iter().enumerate() {
                        a_grad[k * cols + j] += og;
                    }
                }
                EOp::Concat => {
                    let (ca, cb) = (a.cols(), b.cols());
                    let width = ca + cb;
                    {
                        let a_grad = slot(&mut grads, a);
                        for k in 0..a.rows() {
                            for i in 0..ca {
                                a_grad[k * ca + i] += out_grad[k * width + i];
                            }
                        }
                    }
                    let b_grad = slot(&mut grads, b);
                    for k in 0..b.rows() {
                        for i in 0..cb {
                            b_grad[k * cb + i] += out_grad[k * width + ca + i];
                        }
                    }
                }
                EOp::SumCols => {
                    let cols = a.cols();
                    for (idx, g) in slot(&mut grads, a).iter_mut().enumerate() {
                        *g += out_grad[idx / cols];
                    }
                }
                EOp::ReduceSum => {
                    for g in slot(&mut grads, a).iter_mut() {
                        *g += out_grad[0];
                    }
                }
                EOp::ReduceMean => {
                    let n = a.len().max(1) as f32;
                    for g in slot(&mut grads, a).iter_mut() {
                        *g += out_grad[0] / n;
                    }
                }
            }
        }

        for (id, grad) in grads {
            if let Some(tensor) = tensors.get_mut(&id) {
                if tensor.requires_grad {
                    tensor.grad = Some(grad);
                }
            }
        }

        Ok(())
    }
}

/// Copies the gradients computed by [`Tape::backward`] from the arena onto
/// the given parameters.
///
/// A parameter that took part in the forward pass but received no gradient
/// gets zeros.
pub fn pull_grads(
    params: &mut [&mut Tensor],
    tensors: &HashMap<usize, Tensor>,
) -> Result<(), MlError> {
    for p in params.iter_mut() {
        let recorded = lookup(tensors, p.id)?;
        p.grad = Some(recorded.grad.clone().unwrap_or_else(|| vec![0.0; p.len()]));
    }
    Ok(())
}
