use crate::error::RlError;
use ml::Tensor;

/// A fixed discretization of a box into evenly spaced points.
///
/// Points are ordered with the last dimension varying fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    limits: Vec<(f32, f32)>,
    num_points: Vec<usize>,
}

impl Grid {
    pub fn new(limits: Vec<(f32, f32)>, num_points: Vec<usize>) -> Result<Self, RlError> {
        if limits.is_empty() || limits.len() != num_points.len() {
            return Err(RlError::ShapeMismatch {
                context: "grid limits and point counts",
                expected: vec![limits.len()],
                found: vec![num_points.len()],
            });
        }
        if num_points.contains(&0) {
            return Err(RlError::InvalidConfig(
                "grid needs at least one point per dimension".into(),
            ));
        }
        if limits.iter().any(|(lo, hi)| !(lo <= hi) || !lo.is_finite() || !hi.is_finite()) {
            return Err(RlError::InvalidConfig(format!("invalid grid limits {limits:?}")));
        }
        Ok(Self { limits, num_points })
    }

    /// `[-1, 1]^dim` with `points` points per dimension.
    pub fn unit(dim: usize, points: usize) -> Result<Self, RlError> {
        Self::new(vec![(-1.0, 1.0); dim], vec![points; dim])
    }

    pub fn dim(&self) -> usize {
        self.limits.len()
    }

    pub fn len(&self) -> usize {
        self.num_points.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Euclidean length of the box diagonal.
    pub fn diameter(&self) -> f32 {
        self.limits.iter().map(|(lo, hi)| (hi - lo).powi(2)).sum::<f32>().sqrt()
    }

    pub fn point(&self, index: usize) -> Vec<f32> {
        assert!(index < self.len(), "grid index {index} out of range");
        let mut coords = vec![0.0; self.dim()];
        let mut rem = index;
        for d in (0..self.dim()).rev() {
            let n = self.num_points[d];
            let i = rem % n;
            rem /= n;
            let (lo, hi) = self.limits[d];
            coords[d] = if n == 1 { lo } else { lo + (hi - lo) * i as f32 / (n - 1) as f32 };
        }
        coords
    }

    /// All points as a `[len, dim]` batch.
    pub fn all_points(&self) -> Tensor {
        let data = (0..self.len()).flat_map(|i| self.point(i)).collect();
        Tensor::from_vec(vec![self.len(), self.dim()], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_dimension_varies_fastest() {
        let grid = Grid::unit(2, 3).unwrap();
        assert_eq!(grid.len(), 9);
        assert_eq!(grid.point(0), vec![-1.0, -1.0]);
        assert_eq!(grid.point(1), vec![-1.0, 0.0]);
        assert_eq!(grid.point(3), vec![0.0, -1.0]);
        assert_eq!(grid.point(4), vec![0.0, 0.0]);
        assert_eq!(grid.point(8), vec![1.0, 1.0]);
    }

    #[test]
    fn all_points_matches_point() {
        let grid = Grid::new(vec![(0.0, 1.0), (-2.0, 2.0)], vec![2, 5]).unwrap();
        let all = grid.all_points();
        assert_eq!(all.shape, vec![10, 2]);
        for i in 0..grid.len() {
            assert_eq!(all.row(i), grid.point(i).as_slice());
        }
    }

    #[test]
    fn diameter_of_unit_square() {
        let grid = Grid::unit(2, 2).unwrap();
        assert!((grid.diameter() - 8f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn rejects_inconsistent_definitions() {
        assert!(Grid::new(vec![(0.0, 1.0)], vec![2, 2]).is_err());
        assert!(Grid::new(vec![(1.0, 0.0)], vec![2]).is_err());
        assert!(Grid::new(vec![(0.0, 1.0)], vec![0]).is_err());
    }
}
