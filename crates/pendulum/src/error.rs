use thiserror::Error;

#[derive(Error, Debug)]
pub enum PendulumError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("matrix R + B^T P B is singular")]
    Singular,
    #[error(
        "Riccati iteration did not converge after {iterations} iterations (residual {residual:e})"
    )]
    NotConverged { iterations: usize, residual: f64 },
    #[error("Riccati iteration diverged at iteration {iteration}")]
    Diverged { iteration: usize },
}
