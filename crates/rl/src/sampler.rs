use ml::Tensor;

/// Draws batches uniformly from a box.
#[derive(Clone, Debug)]
pub struct UniformSampler {
    limits: Vec<(f32, f32)>,
    rng: fastrand::Rng,
}

impl UniformSampler {
    pub fn new(limits: Vec<(f32, f32)>, seed: u64) -> Self {
        Self { limits, rng: fastrand::Rng::with_seed(seed) }
    }

    /// Samples from `[-1, 1]^dim`.
    pub fn unit(dim: usize, seed: u64) -> Self {
        Self::new(vec![(-1.0, 1.0); dim], seed)
    }

    pub fn dim(&self) -> usize {
        self.limits.len()
    }

    /// A `[n, dim]` batch of independent uniform samples.
    pub fn sample(&mut self, n: usize) -> Tensor {
        let mut data = Vec::with_capacity(n * self.dim());
        for _ in 0..n {
            for &(lo, hi) in &self.limits {
                data.push(lo + (hi - lo) * self.rng.f32());
            }
        }
        Tensor::from_vec(vec![n, self.dim()], data)
    }
}
