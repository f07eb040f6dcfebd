use crate::error::MlError;
use crate::Tensor;

fn gradient(p: &Tensor) -> Result<&[f32], MlError> {
    p.grad.as_deref().ok_or(MlError::MissingGradient(p.id))
}

/// Plain gradient descent.
#[derive(Clone, Debug)]
pub struct Sgd {
    pub lr: f32,
}

impl Sgd {
    #[must_use]
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }

    pub fn step(&mut self, params: &mut [&mut Tensor]) -> Result<(), MlError> {
        for p in params.iter_mut() {
            let grad = gradient(p)?.to_vec();
            for (pv, gv) in p.data.iter_mut().zip(&grad) {
                *pv -= self.lr * gv;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: u32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    #[must_use]
    pub fn new(lr: f32) -> Self {
        Self { lr, beta1: 0.9, beta2: 0.999, eps: 1e-8, t: 0, m: Vec::new(), v: Vec::new() }
    }

    pub fn step(&mut self, params: &mut [&mut Tensor]) -> Result<(), MlError> {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| vec![0.0; p.len()]).collect();
            self.v = params.iter().map(|p| vec![0.0; p.len()]).collect();
        }
        self.t += 1;
        let t = self.t as i32;
        let lr_t = self.lr * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        for (i, p) in params.iter_mut().enumerate() {
            let grad = gradient(p)?.to_vec();
            if grad.len() != p.len() || self.m[i].len() != p.len() {
                return Err(MlError::ShapeMismatch {
                    expected: p.shape.clone(),
                    found: vec![grad.len()],
                });
            }
            for j in 0..p.data.len() {
                self.m[i][j] = self.beta1 * self.m[i][j] + (1.0 - self.beta1) * grad[j];
                self.v[i][j] = self.beta2 * self.v[i][j] + (1.0 - self.beta2) * grad[j].powi(2);
                p.data[j] -= lr_t * self.m[i][j] / (self.v[i][j].sqrt() + self.eps);
            }
        }
        Ok(())
    }
}

/// The optimizers a network can be trained with.
#[derive(Clone, Debug)]
pub enum Optimizer {
    Sgd(Sgd),
    Adam(Adam),
}

impl Optimizer {
    pub fn step(&mut self, params: &mut [&mut Tensor]) -> Result<(), MlError> {
        match self {
            Optimizer::Sgd(o) => o.step(params),
            Optimizer::Adam(o) => o.step(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_with_grad(data: Vec<f32>, grad: Vec<f32>) -> Tensor {
        let mut p = Tensor::from_vec(vec![data.len()], data).with_grad();
        p.grad = Some(grad);
        p
    }

    #[test]
    fn sgd_moves_against_gradient() {
        let mut p = param_with_grad(vec![1.0, -1.0], vec![0.5, -2.0]);
        Sgd::new(0.1).step(&mut [&mut p]).unwrap();
        assert!((p.data[0] - 0.95).abs() < 1e-6);
        assert!((p.data[1] + 0.8).abs() < 1e-6);
    }

    #[test]
    fn adam_first_step_is_learning_rate_sized() {
        let mut p = param_with_grad(vec![0.0], vec![3.0]);
        Adam::new(0.01).step(&mut [&mut p]).unwrap();
        assert!((p.data[0] + 0.01).abs() < 1e-4, "{}", p.data[0]);
    }

    #[test]
    fn zero_learning_rate_is_a_no_op() {
        let mut a = param_with_grad(vec![0.3, 0.7], vec![1.0, -4.0]);
        let mut b = a.clone();
        Optimizer::Sgd(Sgd::new(0.0)).step(&mut [&mut a]).unwrap();
        Optimizer::Adam(Adam::new(0.0)).step(&mut [&mut b]).unwrap();
        assert_eq!(a.data, vec![0.3, 0.7]);
        assert_eq!(b.data, vec![0.3, 0.7]);
    }

    #[test]
    fn missing_gradient_is_reported() {
        let mut p = Tensor::from_vec(vec![1], vec![0.0]);
        assert!(matches!(Sgd::new(0.1).step(&mut [&mut p]), Err(MlError::MissingGradient(_))));
    }
}
