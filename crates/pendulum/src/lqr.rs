//! Discrete-time linear-quadratic regulator.

use crate::error::PendulumError;
use nalgebra::DMatrix;

const MAX_ITERATIONS: usize = 100_000;
const TOLERANCE: f64 = 1e-12;

/// Solution of the discrete algebraic Riccati equation.
#[derive(Clone, Debug)]
pub struct Lqr {
    /// Feedback gain `K`, the optimal policy is `u = -K x`.
    pub gain: DMatrix<f32>,
    /// Cost-to-go matrix `P`, the optimal cost from `x` is `x^T P x`.
    pub cost: DMatrix<f32>,
}

fn check_dims(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> Result<(), PendulumError> {
    let n = a.nrows();
    let m = b.ncols();
    let ok = a.is_square() && b.nrows() == n && q.shape() == (n, n) && r.shape() == (m, m);
    if ok {
        Ok(())
    } else {
        Err(PendulumError::DimensionMismatch(format!(
            "A {:?}, B {:?}, Q {:?}, R {:?}",
            a.shape(),
            b.shape(),
            q.shape(),
            r.shape()
        )))
    }
}

/// Solves `P = Q + A^T P A - A^T P B (R + B^T P B)^-1 B^T P A` by fixed-point
/// iteration starting from `P = Q`, and returns `K = (R + B^T P B)^-1 B^T P A`.
pub fn dlqr(
    a: &DMatrix<f32>,
    b: &DMatrix<f32>,
    q: &DMatrix<f32>,
    r: &DMatrix<f32>,
) -> Result<Lqr, PendulumError> {
    let (a, b, q, r) = (a.clone().cast::<f64>(), b.clone().cast::<f64>(), q.clone().cast::<f64>(), r.clone().cast::<f64>());
    check_dims(&a, &b, &q, &r)?;

    let at = a.transpose();
    let bt = b.transpose();
    let mut p = q.clone();
    let mut residual = f64::INFINITY;
    for iteration in 0..MAX_ITERATIONS {
        let btp = &bt * &p;
        let inv = (&r + &btp * &b).try_inverse().ok_or(PendulumError::Singular)?;
        let next = &q + &at * &p * &a - &at * &p * &b * &inv * &btp * &a;
        residual = (&next - &p).abs().max();
        let scale = next.abs().max().max(1.0);
        p = next;
        if !residual.is_finite() {
            return Err(PendulumError::Diverged { iteration });
        }
        if residual <= TOLERANCE * scale {
            tracing::debug!(iteration, residual, "Riccati iteration converged");
            let inv = (&r + &bt * &p * &b).try_inverse().ok_or(PendulumError::Singular)?;
            let k = inv * &bt * &p * &a;
            return Ok(Lqr { gain: k.cast::<f32>(), cost: p.cast::<f32>() });
        }
    }
    Err(PendulumError::NotConverged { iterations: MAX_ITERATIONS, residual })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Normed;

    #[test]
    fn scalar_riccati_matches_closed_form() {
        // a = b = q = r = 1: p = 1 + p - p^2 / (1 + p)  =>  p^2 - p - 1 = 0
        let one = DMatrix::from_element(1, 1, 1.0f32);
        let lqr = dlqr(&one, &one, &one, &one).unwrap();
        let golden = (1.0 + 5f32.sqrt()) / 2.0;
        assert!((lqr.cost[(0, 0)] - golden).abs() < 1e-5);
        assert!((lqr.gain[(0, 0)] - golden / (1.0 + golden)).abs() < 1e-5);
    }

    #[test]
    fn gain_stabilizes_double_integrator() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0f32, 0.1, 0.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.005f32, 0.1]);
        let (q, r) = (DMatrix::identity(2, 2), DMatrix::from_element(1, 1, 0.1));
        let lqr = dlqr(&a, &b, &q, &r).unwrap();
        let closed = (&a - &b * &lqr.gain).cast::<f64>();
        let spectral_radius = closed
            .complex_eigenvalues()
            .iter()
            .map(|e| e.norm())
            .fold(0.0, f64::max);
        assert!(spectral_radius < 1.0, "closed loop is unstable: {spectral_radius}");
    }

    #[test]
    fn unstabilizable_system_diverges() {
        // b = 0 leaves the unstable mode a = 2 uncontrolled, p grows like 4^k
        let lqr = dlqr(
            &DMatrix::from_element(1, 1, 2.0f32),
            &DMatrix::from_element(1, 1, 0.0f32),
            &DMatrix::from_element(1, 1, 1.0f32),
            &DMatrix::from_element(1, 1, 1.0f32),
        );
        match lqr {
            Err(PendulumError::Diverged { iteration }) => {
                assert!(iteration > 0 && iteration < MAX_ITERATIONS)
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_dimensions_fail() {
        let a = DMatrix::<f32>::identity(2, 2);
        let b = DMatrix::<f32>::zeros(2, 1);
        let err = dlqr(&a, &b, &DMatrix::identity(3, 3), &DMatrix::identity(1, 1));
        assert!(matches!(err, Err(PendulumError::DimensionMismatch(_))));
    }
}
