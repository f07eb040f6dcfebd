#![allow(clippy::module_name_repetitions)]
//! # Approximate policy iteration for the inverted pendulum
//!
//! Actor-critic training of a policy network and a value network against
//! known, differentiable dynamics and reward models, plus the simulation
//! tools used to judge the result:
//!
//! -   [`ActorCritic`]: owns both networks and their optimizers, exposes
//!     pure evaluation and the policy-evaluation / policy-improvement steps.
//! -   [`PolicyIteration`]: the outer training loop and its diagnostics.
//! -   [`compute_roa`] and [`reward_rollout`]: grid-based ground truth for
//!     the region of attraction and the discounted return of any policy.
//! -   [`Experiment`]: wires a whole run together from an
//!     [`ExperimentConfig`], including the LQR baseline.

pub mod agent;
pub mod config;
pub mod error;
pub mod experiment;
pub mod grid;
pub mod networks;
pub mod roa;
pub mod rollout;
pub mod sampler;
pub mod training;

pub use agent::{ActorCritic, ClosedLoop, StepOutcome};
pub use config::{ExperimentConfig, HiddenActivation, ObjectiveScaling, OptimizerKind};
pub use error::RlError;
pub use experiment::Experiment;
pub use grid::Grid;
pub use networks::{NeuralPolicy, ValueNetwork};
pub use roa::{
    compute_roa, mask_agreement, superlevel_roa, LevelSetRoa, RoaEstimate, RoaOptions, Trajectory,
};
pub use rollout::reward_rollout;
pub use sampler::UniformSampler;
pub use training::{IterationRecord, PolicyIteration, TrainingHistory};
