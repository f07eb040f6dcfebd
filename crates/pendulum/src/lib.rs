#![allow(clippy::module_name_repetitions)]
//! # Inverted pendulum control problem
//!
//! The plant and cost side of the pendulum stabilization task, all in
//! normalized coordinates where states and actions live in `[-1, 1]`:
//!
//! -   [`InvertedPendulum`]: nonlinear dynamics integrated with explicit
//!     Euler substeps, and its exact Jacobian at the origin as a
//!     [`LinearSystem`].
//! -   [`QuadraticReward`]: `-(x^T Q x + u^T R u)`.
//! -   [`dlqr`]: discrete-time LQR, the ground-truth baseline, wrapped into
//!     a [`LinearPolicy`].
//!
//! Dynamics, rewards and policies are batched and evaluated through the
//! `ml` recorder, so they compose into differentiable objectives.

pub mod dynamics;
pub mod error;
pub mod lqr;
pub mod params;
pub mod policy;
pub mod reward;

pub use dynamics::{tensor_from_matrix, Dynamics, InvertedPendulum, LinearSystem};
pub use error::PendulumError;
pub use lqr::{dlqr, Lqr};
pub use params::PendulumParams;
pub use policy::{saturate, LinearPolicy, Policy, ACTION_BOUNDS};
pub use reward::{QuadraticReward, Reward};
