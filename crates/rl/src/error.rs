use ml::MlError;
use pendulum::PendulumError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RlError {
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch { context: &'static str, expected: Vec<usize>, found: Vec<usize> },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Ml(#[from] MlError),
    #[error(transparent)]
    Pendulum(#[from] PendulumError),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
