//! # Region of attraction
//!
//! Empirical ROA estimation by forward simulation. Every grid point is
//! rolled out under a closed-loop step; it belongs to the ROA if its
//! trajectory comes within `tolerance` of the equilibrium at any time before
//! the horizon runs out. All still-active points advance together as one
//! batch.

use crate::error::RlError;
use crate::grid::Grid;
use ml::Tensor;

#[derive(Clone, Debug)]
pub struct RoaOptions {
    /// Maximum number of states examined per trajectory, initial state included.
    pub horizon: usize,
    pub tolerance: f32,
    /// Defaults to the origin.
    pub equilibrium: Option<Vec<f32>>,
    pub keep_trajectories: bool,
}

impl RoaOptions {
    pub fn new(horizon: usize, tolerance: f32) -> Self {
        Self { horizon, tolerance, equilibrium: None, keep_trajectories: false }
    }

    #[must_use]
    pub fn with_trajectories(mut self) -> Self {
        self.keep_trajectories = true;
        self
    }

    #[must_use]
    pub fn with_equilibrium(mut self, equilibrium: Vec<f32>) -> Self {
        self.equilibrium = Some(equilibrium);
        self
    }
}

/// Ordered states visited from one grid point.
pub type Trajectory = Vec<Vec<f32>>;

#[derive(Clone, Debug, PartialEq)]
pub struct RoaEstimate {
    /// One flag per grid point, in grid order.
    pub mask: Vec<bool>,
    /// Per grid point, the states up to and including the first one within
    /// tolerance, or up to the horizon.
    pub trajectories: Option<Vec<Trajectory>>,
}

impl RoaEstimate {
    pub fn size(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn fraction(&self) -> f32 {
        if self.mask.is_empty() {
            0.0
        } else {
            self.size() as f32 / self.mask.len() as f32
        }
    }
}

pub(crate) fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

pub fn compute_roa<F>(
    grid: &Grid,
    mut closed_loop_step: F,
    options: &RoaOptions,
) -> Result<RoaEstimate, RlError>
where
    F: FnMut(&Tensor) -> Tensor,
{
    if options.horizon == 0 {
        return Err(RlError::InvalidConfig("ROA horizon must be at least 1".into()));
    }
    let dim = grid.dim();
    let equilibrium = options.equilibrium.clone().unwrap_or_else(|| vec![0.0; dim]);
    if equilibrium.len() != dim {
        return Err(RlError::ShapeMismatch {
            context: "equilibrium",
            expected: vec![dim],
            found: vec![equilibrium.len()],
        });
    }

    let points = grid.all_points();
    let n = grid.len();
    let mut current: Vec<Vec<f32>> = (0..n).map(|i| points.row(i).to_vec()).collect();
    let mut trajectories = options
        .keep_trajectories
        .then(|| current.iter().map(|s| vec![s.clone()]).collect::<Vec<Trajectory>>());
    let mut mask = vec![false; n];
    let mut active: Vec<usize> = (0..n).collect();

    for t in 0..options.horizon {
        active.retain(|&i| {
            let hit = distance(&current[i], &equilibrium) <= options.tolerance;
            mask[i] = hit;
            !hit
        });
        if active.is_empty() || t + 1 == options.horizon {
            break;
        }

        let rows: Vec<Vec<f32>> = active.iter().map(|&i| current[i].clone()).collect();
        let next = closed_loop_step(&Tensor::from_rows(&rows, dim));
        if next.rows() != active.len() || next.cols() != dim {
            return Err(RlError::ShapeMismatch {
                context: "closed-loop step output",
                expected: vec![active.len(), dim],
                found: next.shape.clone(),
            });
        }
        for (k, &i) in active.iter().enumerate() {
            current[i] = next.row(k).to_vec();
            if let Some(trajs) = trajectories.as_mut() {
                trajs[i].push(current[i].clone());
            }
        }
    }

    tracing::debug!(
        inside = mask.iter().filter(|&&m| m).count(),
        total = n,
        "region of attraction estimated"
    );
    Ok(RoaEstimate { mask, trajectories })
}

/// The implicit ROA of a value function: the largest superlevel set
/// `{V > c}` on the grid that lies inside `roa`.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelSetRoa {
    /// Highest value among grid points outside `roa`, `-inf` if there are none.
    pub threshold: f32,
    pub mask: Vec<bool>,
}

pub fn superlevel_roa(values: &[f32], roa: &[bool]) -> Result<LevelSetRoa, RlError> {
    if values.len() != roa.len() {
        return Err(RlError::ShapeMismatch {
            context: "value grid and ROA mask",
            expected: vec![roa.len()],
            found: vec![values.len()],
        });
    }
    let threshold = values
        .iter()
        .zip(roa)
        .filter(|(_, &inside)| !inside)
        .map(|(&v, _)| v)
        .fold(f32::NEG_INFINITY, f32::max);
    let mask = values.iter().map(|&v| v > threshold).collect();
    Ok(LevelSetRoa { threshold, mask })
}

/// Fraction of grid points on which two masks agree.
pub fn mask_agreement(a: &[bool], b: &[bool]) -> Result<f32, RlError> {
    if a.len() != b.len() {
        return Err(RlError::ShapeMismatch {
            context: "ROA masks",
            expected: vec![a.len()],
            found: vec![b.len()],
        });
    }
    if a.is_empty() {
        return Ok(1.0);
    }
    Ok(a.iter().zip(b).filter(|(x, y)| x == y).count() as f32 / a.len() as f32)
}
