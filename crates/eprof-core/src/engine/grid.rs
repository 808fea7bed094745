use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative slack (in units of the step) absorbed when deciding whether the final
/// arithmetic point lands on the requested end height.
const DRIFT_TOLERANCE: f64 = 1e-6;

/// Largest number of heights [`HeightGrid::arange`] will generate. Every height costs
/// one energy evaluation, so a grid this size is already far beyond any real sweep.
pub const MAX_POINTS: usize = 100_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("Height step must be a positive number, got {0}")]
    NonPositiveStep(f64),

    #[error("Height range bounds must be finite, got {start} to {end}")]
    NonFinite { start: f64, end: f64 },

    #[error("Height range is empty: end {end} lies below start {start}")]
    EmptyRange { start: f64, end: f64 },

    #[error("Height grid must contain at least one point")]
    NoPoints,

    #[error("Heights must be finite and strictly increasing (violated at index {index})")]
    NotIncreasing { index: usize },

    #[error("Height subset stride must be at least 1")]
    ZeroStride,

    #[error("Height range would produce {requested:.0} points; at most {max} are allowed")]
    TooManyPoints { requested: f64, max: usize },
}

/// The requested `start..=end` sweep with its increment, in Angstroms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl HeightRange {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    pub fn to_grid(&self) -> Result<HeightGrid, GridError> {
        HeightGrid::arange(self.start, self.end, self.step)
    }
}

/// An ordered, strictly increasing, non-empty sequence of adsorption heights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct HeightGrid {
    heights: Vec<f64>,
}

impl HeightGrid {
    /// Inclusive arithmetic sequence from `start` towards `end` in increments of `step`.
    ///
    /// The sequence always reaches `end`: when the range is not a whole number of steps
    /// the last point lies one step beyond it, and a last point that misses `end` only by
    /// floating-point drift is snapped onto `end` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] for a non-positive step, non-finite bounds, `end < start`
    /// or a sweep longer than [`MAX_POINTS`].
    pub fn arange(start: f64, end: f64, step: f64) -> Result<Self, GridError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(GridError::NonPositiveStep(step));
        }
        if !start.is_finite() || !end.is_finite() {
            return Err(GridError::NonFinite { start, end });
        }
        if end < start {
            return Err(GridError::EmptyRange { start, end });
        }

        let intervals = ((end - start) / step - DRIFT_TOLERANCE).ceil().max(0.0);
        let requested = intervals + 1.0;
        if requested > MAX_POINTS as f64 {
            return Err(GridError::TooManyPoints {
                requested,
                max: MAX_POINTS,
            });
        }
        let intervals = intervals as usize;
        let mut heights: Vec<f64> = (0..=intervals)
            .map(|i| start + i as f64 * step)
            .collect();

        if let Some(last) = heights.last_mut() {
            if (*last - end).abs() <= DRIFT_TOLERANCE * step {
                *last = end;
            }
        }
        Ok(Self { heights })
    }

    /// Wraps an explicit list of heights.
    pub fn from_heights(heights: Vec<f64>) -> Result<Self, GridError> {
        if heights.is_empty() {
            return Err(GridError::NoPoints);
        }
        if let Some(index) = heights.iter().position(|h| !h.is_finite()) {
            return Err(GridError::NotIncreasing { index });
        }
        if let Some(index) = heights.windows(2).position(|w| w[1] <= w[0]) {
            return Err(GridError::NotIncreasing { index: index + 1 });
        }
        Ok(Self { heights })
    }

    /// Every `stride`-th height, starting with the first.
    pub fn every(&self, stride: usize) -> Result<Self, GridError> {
        if stride == 0 {
            return Err(GridError::ZeroStride);
        }
        Ok(Self {
            heights: self.heights.iter().copied().step_by(stride).collect(),
        })
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.heights[0]
    }

    pub fn last(&self) -> f64 {
        self.heights[self.heights.len() - 1]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.heights.iter().copied()
    }
}

impl TryFrom<Vec<f64>> for HeightGrid {
    type Error = GridError;

    fn try_from(heights: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_heights(heights)
    }
}

impl From<HeightGrid> for Vec<f64> {
    fn from(grid: HeightGrid) -> Self {
        grid.heights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_has_31_points_and_reaches_end() {
        let grid = HeightGrid::arange(2.0, 8.0, 0.2).unwrap();
        assert_eq!(grid.len(), 31);
        assert_eq!(grid.first(), 2.0);
        assert!(grid.last() >= 8.0 && grid.last() <= 8.2);
        assert!(grid.heights().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn partial_final_step_overshoots_end() {
        let grid = HeightGrid::arange(2.0, 8.1, 0.2).unwrap();
        assert_eq!(grid.len(), 32);
        assert!(grid.last() >= 8.1);
        assert!((grid.last() - 8.2).abs() < 1e-9);
    }

    #[test]
    fn degenerate_range_yields_single_point() {
        let grid = HeightGrid::arange(3.0, 3.0, 0.5).unwrap();
        assert_eq!(grid.heights(), &[3.0]);
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert_eq!(
            HeightGrid::arange(2.0, 8.0, 0.0).unwrap_err(),
            GridError::NonPositiveStep(0.0)
        );
        assert!(matches!(
            HeightGrid::arange(2.0, 8.0, -0.1),
            Err(GridError::NonPositiveStep(_))
        ));
        assert!(matches!(
            HeightGrid::arange(8.0, 2.0, 0.2),
            Err(GridError::EmptyRange { .. })
        ));
        assert!(matches!(
            HeightGrid::arange(f64::NAN, 2.0, 0.2),
            Err(GridError::NonFinite { .. })
        ));
    }

    #[test]
    fn oversized_sweeps_are_rejected_before_allocating() {
        for (start, end, step) in [
            (2.0, 8.0, 1e-9),
            (0.0, 1e300, 1e-300),
            (-f64::MAX, f64::MAX, 1.0),
        ] {
            assert!(matches!(
                HeightGrid::arange(start, end, step),
                Err(GridError::TooManyPoints { max: MAX_POINTS, .. })
            ));
        }

        let largest = HeightGrid::arange(0.0, (MAX_POINTS - 1) as f64, 1.0).unwrap();
        assert_eq!(largest.len(), MAX_POINTS);
        assert!(matches!(
            HeightGrid::arange(0.0, MAX_POINTS as f64, 1.0),
            Err(GridError::TooManyPoints { .. })
        ));
    }

    #[test]
    fn explicit_heights_must_increase() {
        assert!(HeightGrid::from_heights(vec![2.0, 3.0, 4.0]).is_ok());
        assert_eq!(
            HeightGrid::from_heights(vec![2.0, 2.0]).unwrap_err(),
            GridError::NotIncreasing { index: 1 }
        );
        assert_eq!(
            HeightGrid::from_heights(Vec::new()).unwrap_err(),
            GridError::NoPoints
        );
    }

    #[test]
    fn stride_subset_keeps_first_point() {
        let grid = HeightGrid::from_heights(vec![2.0, 2.5, 3.0, 3.5, 4.0]).unwrap();
        assert_eq!(grid.every(2).unwrap().heights(), &[2.0, 3.0, 4.0]);
        assert_eq!(grid.every(1).unwrap(), grid);
        assert_eq!(grid.every(0).unwrap_err(), GridError::ZeroStride);
    }

    #[test]
    fn grid_serializes_as_plain_array() {
        let grid = HeightGrid::from_heights(vec![2.0, 3.0]).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(json, "[2.0,3.0]");
        assert!(serde_json::from_str::<HeightGrid>("[3.0,2.0]").is_err());
    }
}
