use crate::graph::{EOp, Node};
use crate::recorder::Recorder;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A dense, row-major `f32` tensor.
///
/// Operations are evaluated eagerly. Each one appends a [`Node`] to the
/// supplied [`Recorder`] and stores its inputs and output in the `tensors`
/// arena, keyed by id, so that a [`crate::tape::Tape`] can replay them in
/// reverse.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub id: usize,
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    pub requires_grad: bool,
    pub grad: Option<Vec<f32>>,
}

impl Tensor {
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {shape:?} does not match {} elements",
            data.len()
        );
        Self { id: next_id(), data, shape, requires_grad: false, grad: None }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self::from_vec(shape, vec![0.0; len])
    }

    pub fn scalar(value: f32) -> Self {
        Self::from_vec(vec![1], vec![value])
    }

    /// Builds a `[rows.len(), dim]` batch from a list of equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>], dim: usize) -> Self {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            assert_eq!(row.len(), dim, "row has {} entries, expected {dim}", row.len());
            data.extend_from_slice(row);
        }
        Self::from_vec(vec![rows.len(), dim], data)
    }

    #[must_use]
    pub fn with_grad(mut self) -> Self {
        self.requires_grad = true;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of rows (the leading dimension).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of entries per row. A 1-D tensor is treated as a column.
    pub fn cols(&self) -> usize {
        if self.shape.len() < 2 {
            1
        } else {
            self.shape[1..].iter().product()
        }
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let c = self.cols();
        &self.data[i * c..(i + 1) * c]
    }

    /// Copies the values into a fresh tensor that no recorded op refers to.
    ///
    /// Gradients never flow through the copy.
    #[must_use]
    pub fn detach(&self) -> Tensor {
        Tensor::from_vec(self.shape.clone(), self.data.clone())
    }

    fn emit(
        &self,
        op: EOp,
        other: Option<&Tensor>,
        out: Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        tensors.entry(self.id).or_insert_with(|| self.clone());
        let b = match other {
            Some(t) => {
                tensors.entry(t.id).or_insert_with(|| t.clone());
                t.id
            }
            None => self.id,
        };
        tensors.insert(out.id, out.clone());
        recorder.record(Node { op, a: self.id, b, out: out.id });
        out
    }

    fn zip_with(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
        assert_eq!(self.shape, other.shape, "elementwise op on mismatched shapes");
        let data = self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect();
        Tensor::from_vec(self.shape.clone(), data)
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor::from_vec(self.shape.clone(), self.data.iter().map(|&v| f(v)).collect())
    }

    pub fn add(
        &self,
        other: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.zip_with(other, |a, b| a + b);
        self.emit(EOp::Add, Some(other), out, recorder, tensors)
    }

    pub fn sub(
        &self,
        other: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.zip_with(other, |a, b| a - b);
        self.emit(EOp::Sub, Some(other), out, recorder, tensors)
    }

    pub fn mul(
        &self,
        other: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.zip_with(other, |a, b| a * b);
        self.emit(EOp::Mul, Some(other), out, recorder, tensors)
    }

    pub fn mul_scalar(
        &self,
        s: f32,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.map(|v| v * s);
        self.emit(EOp::MulScalar, Some(&Tensor::scalar(s)), out, recorder, tensors)
    }

    /// `self` is a weight matrix `[out, in]`, `x` a batch `[n, in]`; the
    /// result is the batch `[n, out]` of `W x_k`.
    pub fn matmul(
        &self,
        x: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        assert_eq!(self.shape.len(), 2, "matmul weight must be 2-D");
        let (out_dim, in_dim) = (self.shape[0], self.shape[1]);
        assert_eq!(
            x.cols(),
            in_dim,
            "matmul: batch has {} columns, weight expects {in_dim}",
            x.cols()
        );
        let batch = x.rows();
        let mut y = vec![0.0f32; batch * out_dim];
        for k in 0..batch {
            let xk = &x.data[k * in_dim..(k + 1) * in_dim];
            for i in 0..out_dim {
                let wi = &self.data[i * in_dim..(i + 1) * in_dim];
                y[k * out_dim + i] = wi.iter().zip(xk).map(|(w, v)| w * v).sum();
            }
        }
        let out = Tensor::from_vec(vec![batch, out_dim], y);
        self.emit(EOp::MatMul, Some(x), out, recorder, tensors)
    }

    /// Adds the bias vector `b` to every row of `self`.
    pub fn add_broadcast(
        &self,
        b: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let dim = self.cols();
        assert_eq!(b.len(), dim, "bias has {} entries, rows have {dim}", b.len());
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, &v)| v + b.data[i % dim])
            .collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(EOp::AddBroadcast, Some(b), out, recorder, tensors)
    }

    pub fn tanh(
        &self,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.map(f32::tanh);
        self.emit(EOp::Tanh, None, out, recorder, tensors)
    }

    pub fn relu(
        &self,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.map(|v| v.max(0.0));
        self.emit(EOp::Relu, None, out, recorder, tensors)
    }

    pub fn sin(&self, recorder: &mut dyn Recorder, tensors: &mut HashMap<usize, Tensor>) -> Tensor {
        let out = self.map(f32::sin);
        self.emit(EOp::Sin, None, out, recorder, tensors)
    }

    pub fn abs(&self, recorder: &mut dyn Recorder, tensors: &mut HashMap<usize, Tensor>) -> Tensor {
        let out = self.map(f32::abs);
        self.emit(EOp::Abs, None, out, recorder, tensors)
    }

    pub fn clamp(
        &self,
        min: f32,
        max: f32,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = self.map(|v| v.clamp(min, max));
        let bounds = Tensor::from_vec(vec![2], vec![min, max]);
        self.emit(EOp::Clamp, Some(&bounds), out, recorder, tensors)
    }

    /// Extracts column `j` of a `[n, d]` batch as `[n, 1]`.
    pub fn column(
        &self,
        j: usize,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let cols = self.cols();
        assert!(j < cols, "column {j} out of range for {cols} columns");
        let data = (0..self.rows()).map(|k| self.data[k * cols + j]).collect();
        let out = Tensor::from_vec(vec![self.rows(), 1], data);
        self.emit(EOp::Column(j), None, out, recorder, tensors)
    }

    /// Joins two batches with the same row count side by side.
    pub fn concat_cols(
        &self,
        other: &Tensor,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        assert_eq!(self.rows(), other.rows(), "concat_cols on different row counts");
        let (ca, cb) = (self.cols(), other.cols());
        let mut data = Vec::with_capacity(self.len() + other.len());
        for k in 0..self.rows() {
            data.extend_from_slice(&self.data[k * ca..(k + 1) * ca]);
            data.extend_from_slice(&other.data[k * cb..(k + 1) * cb]);
        }
        let out = Tensor::from_vec(vec![self.rows(), ca + cb], data);
        self.emit(EOp::Concat, Some(other), out, recorder, tensors)
    }

    /// Sums each row of a `[n, d]` batch into `[n, 1]`.
    pub fn sum_cols(
        &self,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let cols = self.cols();
        let data = self.data.chunks(cols).map(|r| r.iter().sum()).collect();
        let out = Tensor::from_vec(vec![self.rows(), 1], data);
        self.emit(EOp::SumCols, None, out, recorder, tensors)
    }

    pub fn reduce_sum(
        &self,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let out = Tensor::scalar(self.data.iter().sum());
        self.emit(EOp::ReduceSum, None, out, recorder, tensors)
    }

    pub fn reduce_mean(
        &self,
        recorder: &mut dyn Recorder,
        tensors: &mut HashMap<usize, Tensor>,
    ) -> Tensor {
        let n = self.len().max(1) as f32;
        let out = Tensor::scalar(self.data.iter().sum::<f32>() / n);
        self.emit(EOp::ReduceMean, None, out, recorder, tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn ids_are_unique() {
        let a = Tensor::scalar(1.0);
        let b = Tensor::scalar(1.0);
        assert_ne!(a.id, b.id);
        assert_ne!(a.detach().id, a.id);
    }

    #[test]
    fn matmul_applies_weight_to_every_row() {
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let w = Tensor::from_vec(vec![1, 2], vec![2.0, -1.0]);
        let x = Tensor::from_vec(vec![3, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let y = w.matmul(&x, &mut g, &mut tensors);
        assert_eq!(y.shape, vec![3, 1]);
        assert_eq!(y.data, vec![2.0, -1.0, 1.0]);
    }

    #[test]
    fn column_and_concat_are_inverse() {
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let x = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let c0 = x.column(0, &mut g, &mut tensors);
        let c1 = x.column(1, &mut g, &mut tensors);
        assert_eq!(c0.data, vec![1.0, 3.0]);
        let joined = c0.concat_cols(&c1, &mut g, &mut tensors);
        assert_eq!(joined.data, x.data);
        assert_eq!(joined.shape, x.shape);
    }

    #[test]
    fn ops_register_in_arena_and_recorder() {
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let x = Tensor::from_vec(vec![2, 1], vec![-3.0, 0.5]);
        let y = x.clamp(-1.0, 1.0, &mut g, &mut tensors).sum_cols(&mut g, &mut tensors);
        assert_eq!(y.data, vec![-1.0, 0.5]);
        assert!(tensors.contains_key(&x.id));
        assert!(tensors.contains_key(&y.id));
        assert_eq!(g.nodes().len(), 2);
    }

    #[test]
    #[should_panic(expected = "mismatched shapes")]
    fn elementwise_shape_mismatch_panics() {
        let mut g = Graph::new();
        let mut tensors = HashMap::new();
        let a = Tensor::zeros(vec![2, 1]);
        let b = Tensor::zeros(vec![3, 1]);
        let _ = a.add(&b, &mut g, &mut tensors);
    }
}
