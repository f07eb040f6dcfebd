use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("tensor {0} is not registered in the arena")]
    MissingTensor(usize),
    #[error("parameter {0} has no gradient; run backward and pull_grads first")]
    MissingGradient(usize),
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },
}
