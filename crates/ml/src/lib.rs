//! # ML building blocks
//!
//! Dense `f32` tensors with tape-based reverse-mode automatic
//! differentiation, small multi-layer perceptrons and first-order
//! optimizers. Every operation is evaluated eagerly and recorded; a
//! [`tape::Tape`] can then replay the recording backwards to obtain
//! gradients for any tensor flagged `requires_grad`.
//!
//! ```rust,ignore
//! let mut tape = Tape::new();
//! let mut tensors = HashMap::new();
//! let y = net.forward(&x, &mut tape, &mut tensors);
//! let loss = y.reduce_mean(&mut tape, &mut tensors);
//! tape.backward(&loss, &mut tensors)?;
//! pull_grads(&mut net.params_mut(), &tensors)?;
//! optimizer.step(&mut net.params_mut())?;
//! ```

pub mod error;
pub mod graph;
pub mod nn;
pub mod optim;
pub mod recorder;
pub mod tape;
pub mod tensor;

pub use error::MlError;
pub use graph::Graph;
pub use nn::{max_abs_change, Activation, Dense, Mlp};
pub use optim::{Adam, Optimizer, Sgd};
pub use recorder::Recorder;
pub use tape::{pull_grads, Tape};
pub use tensor::Tensor;
