//! Pattern planning for the coil bed: where the swarm should end up, how far
//! each coil is from that shape, and the timed band sequence that herds the
//! swarm there.
//!
//! The planner never touches the transport. It mutates a [`GridState`] that
//! the caller owns and encodes/sends on its own cadence.

use std::collections::VecDeque;

use coilbed_grid::{GridError, GridState, InvalidConfig};
use serde::{Deserialize, Serialize};

pub mod engine;

pub use engine::{HerdConfig, HerdFormationEngine, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Config(#[from] InvalidConfig),
    /// Herding requested with no target cells. An empty mask would make the
    /// distance transform call every cell "already at the target", so the
    /// engine refuses to start instead.
    #[error("herding requested with an empty target mask")]
    EmptyTarget,
    #[error("grid is {grid_rows}x{grid_cols} but the plan was built for {plan_rows}x{plan_cols}")]
    DimensionMismatch {
        grid_rows: usize,
        grid_cols: usize,
        plan_rows: usize,
        plan_cols: usize,
    },
}

/// The desired final shape: an immutable set of cell coordinates, fixed for
/// the lifetime of a herding session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMask {
    rows: usize,
    cols: usize,
    mask: Vec<bool>,
}

impl TargetMask {
    pub fn new<I>(rows: usize, cols: usize, cells: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        if rows == 0 || cols == 0 {
            return Err(GridError::InvalidDimension { rows, cols }.into());
        }
        let mut mask = vec![false; rows * cols];
        for (row, col) in cells {
            if row >= rows || col >= cols {
                return Err(GridError::OutOfBounds {
                    row,
                    col,
                    rows,
                    cols,
                }
                .into());
            }
            mask[row * cols + col] = true;
        }
        Ok(TargetMask { rows, cols, mask })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.mask[row * self.cols + col]
    }

    pub fn is_empty(&self) -> bool {
        !self.mask.iter().any(|&m| m)
    }

    /// Target coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(idx, _)| (idx / self.cols, idx % self.cols))
    }
}

/// Graph distance from every cell to its nearest target cell, over the
/// 4-connected grid.
///
/// Built once per mask by multi-source BFS and immutable afterward. Cells a
/// BFS from the mask cannot reach (possible only when the mask is empty) are
/// recorded as distance 0, merging "already at target" and "unreachable";
/// callers that care guard with [`PlanError::EmptyTarget`] before building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceField {
    rows: usize,
    cols: usize,
    dist: Vec<u32>,
    max_distance: u32,
}

impl DistanceField {
    pub fn build(mask: &TargetMask) -> Self {
        let (rows, cols) = (mask.rows, mask.cols);
        let mut dist: Vec<Option<u32>> = vec![None; rows * cols];
        let mut queue = VecDeque::new();

        for (row, col) in mask.iter() {
            dist[row * cols + col] = Some(0);
            queue.push_back((row, col));
        }

        // A cell's distance is final the first time it is assigned; the
        // frontier is monotonically non-decreasing so no revisit can improve
        // on it.
        while let Some((row, col)) = queue.pop_front() {
            let here = dist[row * cols + col].unwrap_or(0);
            let neighbors = [
                (row.wrapping_sub(1), col),
                (row + 1, col),
                (row, col.wrapping_sub(1)),
                (row, col + 1),
            ];
            for (nrow, ncol) in neighbors {
                if nrow >= rows || ncol >= cols {
                    continue;
                }
                let slot = &mut dist[nrow * cols + ncol];
                if slot.is_none() {
                    *slot = Some(here + 1);
                    queue.push_back((nrow, ncol));
                }
            }
        }

        let dist: Vec<u32> = dist.into_iter().map(|d| d.unwrap_or(0)).collect();
        let max_distance = dist.iter().copied().max().unwrap_or(0);
        DistanceField {
            rows,
            cols,
            dist,
            max_distance,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn distance(&self, row: usize, col: usize) -> Option<u32> {
        (row < self.rows && col < self.cols).then(|| self.dist[row * self.cols + col])
    }

    /// The largest distance present in the field.
    pub fn max_distance(&self) -> u32 {
        self.max_distance
    }

    /// All cells at distance exactly `k`.
    pub fn band(&self, k: u32) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.dist
            .iter()
            .enumerate()
            .filter(move |(_, &d)| d == k)
            .map(|(idx, _)| (idx / self.cols, idx % self.cols))
    }

    pub(crate) fn matches(&self, grid: &GridState) -> Result<(), PlanError> {
        if grid.rows() != self.rows || grid.cols() != self.cols {
            return Err(PlanError::DimensionMismatch {
                grid_rows: grid.rows(),
                grid_cols: grid.cols(),
                plan_rows: self.rows,
                plan_cols: self.cols,
            });
        }
        Ok(())
    }
}
