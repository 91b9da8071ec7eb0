//! Actuation state for the coil bed.
//!
//! The bed is an n×m array of bipolar electromagnets. Each cell drives one
//! coil through two PWM channels of opposite polarity; the firmware only
//! accepts one channel per coil at a time, so a cell is never driven in both
//! polarities at once. This crate owns the grid state and its mutation rules;
//! it knows nothing about the wire format (see `coilbed-protocol`) or about
//! how patterns are chosen (see `coilbed-planner` and the feeder).

use std::time::Instant;

use serde::{Deserialize, Serialize};

pub mod decay;

pub use decay::DecayModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("grid dimensions must be positive (got {rows}x{cols})")]
    InvalidDimension { rows: usize, cols: usize },
    #[error("cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

/// A non-positive timing or intensity constant, rejected before any session
/// starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(pub &'static str);

/// Which channel of a coil to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
    Off,
}

/// One coil. Intensities are in `[0, max_intensity]`; at most one of the two
/// is non-zero at any time.
///
/// `activated_at` is the impulse timestamp used by [`DecayModel`]; cells
/// driven by other controllers leave it `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cell {
    pub positive: f32,
    pub negative: f32,
    pub activated_at: Option<Instant>,
}

impl Cell {
    pub fn is_off(&self) -> bool {
        self.positive == 0.0 && self.negative == 0.0
    }
}

/// The n×m actuation grid, row-major.
///
/// Mutated in place by exactly one controller per session. A polarity write
/// is atomic per cell: setting one channel always zeroes the other in the
/// same call.
#[derive(Debug, Clone, PartialEq)]
pub struct GridState {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl GridState {
    /// Creates an all-zero grid.
    pub fn new(rows: usize, cols: usize) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::InvalidDimension { rows, cols });
        }
        Ok(GridState {
            rows,
            cols,
            cells: vec![Cell::default(); rows * cols],
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn index(&self, row: usize, col: usize) -> Result<usize, GridError> {
        if row >= self.rows || col >= self.cols {
            return Err(GridError::OutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    pub fn get(&self, row: usize, col: usize) -> Result<&Cell, GridError> {
        self.index(row, col).map(|idx| &self.cells[idx])
    }

    /// Drives one cell. Setting `Positive` zeroes the negative channel and
    /// vice versa; `Off` zeroes both. The impulse timestamp is cleared; use
    /// [`DecayModel::activate`] for timestamped impulses.
    pub fn set_cell(
        &mut self,
        row: usize,
        col: usize,
        polarity: Polarity,
        intensity: f32,
    ) -> Result<(), GridError> {
        let idx = self.index(row, col)?;
        self.cells[idx] = match polarity {
            Polarity::Positive => Cell {
                positive: intensity,
                negative: 0.0,
                activated_at: None,
            },
            Polarity::Negative => Cell {
                positive: 0.0,
                negative: intensity,
                activated_at: None,
            },
            Polarity::Off => Cell::default(),
        };
        Ok(())
    }

    /// Zeroes every cell, both channels, and all impulse timestamps.
    pub fn clear_all(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
    }

    /// Clears the grid and then drives the given cells at `intensity` in one
    /// call. This is the "full overwrite" write used by pattern controllers:
    /// nothing from the previous pattern survives.
    pub fn overwrite<I>(&mut self, cells: I, polarity: Polarity, intensity: f32) -> Result<(), GridError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        self.clear_all();
        for (row, col) in cells {
            self.set_cell(row, col, polarity, intensity)?;
        }
        Ok(())
    }

    /// Cells in row-major order, with their coordinates.
    pub fn cells(&self) -> impl Iterator<Item = ((usize, usize), &Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| ((idx / self.cols, idx % self.cols), cell))
    }

    pub(crate) fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    pub(crate) fn cell_mut(&mut self, row: usize, col: usize) -> Result<&mut Cell, GridError> {
        let idx = self.index(row, col)?;
        Ok(&mut self.cells[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_dimension_is_rejected() {
        assert_eq!(
            GridState::new(0, 8),
            Err(GridError::InvalidDimension { rows: 0, cols: 8 })
        );
        assert_eq!(
            GridState::new(4, 0),
            Err(GridError::InvalidDimension { rows: 4, cols: 0 })
        );
    }

    #[test]
    fn out_of_bounds_is_rejected_and_leaves_grid_intact() {
        let mut grid = GridState::new(4, 8).unwrap();
        grid.set_cell(1, 2, Polarity::Positive, 10.0).unwrap();
        let before = grid.clone();
        assert!(grid.set_cell(4, 0, Polarity::Negative, 10.0).is_err());
        assert!(grid.set_cell(0, 8, Polarity::Negative, 10.0).is_err());
        assert_eq!(grid, before);
    }

    #[test]
    fn opposite_polarity_overwrites() {
        let mut grid = GridState::new(4, 8).unwrap();
        grid.set_cell(2, 3, Polarity::Positive, 10.0).unwrap();
        grid.set_cell(2, 3, Polarity::Negative, 7.0).unwrap();
        let cell = grid.get(2, 3).unwrap();
        assert_eq!(cell.positive, 0.0);
        assert_eq!(cell.negative, 7.0);
        grid.set_cell(2, 3, Polarity::Off, 99.0).unwrap();
        assert!(grid.get(2, 3).unwrap().is_off());
    }

    #[test]
    fn clear_all_zeroes_everything() {
        let mut grid = GridState::new(4, 8).unwrap();
        for col in 0..8 {
            grid.set_cell(1, col, Polarity::Negative, 10.0).unwrap();
        }
        grid.clear_all();
        assert!(grid.cells().all(|(_, cell)| cell.is_off()));
    }

    #[test]
    fn overwrite_replaces_previous_pattern() {
        let mut grid = GridState::new(4, 8).unwrap();
        grid.overwrite([(0, 0), (1, 1)], Polarity::Positive, 10.0)
            .unwrap();
        grid.overwrite([(3, 7)], Polarity::Negative, 10.0).unwrap();
        assert!(grid.get(0, 0).unwrap().is_off());
        assert!(grid.get(1, 1).unwrap().is_off());
        assert_eq!(grid.get(3, 7).unwrap().negative, 10.0);
    }

    fn polarity() -> impl Strategy<Value = Polarity> {
        prop_oneof![
            Just(Polarity::Positive),
            Just(Polarity::Negative),
            Just(Polarity::Off),
        ]
    }

    proptest! {
        // The mutual-exclusion invariant holds after any sequence of writes.
        #[test]
        fn channels_are_mutually_exclusive(
            writes in proptest::collection::vec(
                (0usize..4, 0usize..8, polarity(), 0.0f32..10.0), 0..64
            )
        ) {
            let mut grid = GridState::new(4, 8).unwrap();
            for (row, col, pol, intensity) in writes {
                grid.set_cell(row, col, pol, intensity).unwrap();
            }
            for (_, cell) in grid.cells() {
                prop_assert_eq!(cell.positive * cell.negative, 0.0);
            }
        }
    }
}
