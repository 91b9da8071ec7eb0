//! Linear decay for impulse-activated cells.
//!
//! The manual controller drives a cell to full intensity on a click and lets
//! it relax back to zero over a fixed window. Decay is independent per cell;
//! each tick recomputes the active channel from the activation timestamp, so
//! the caller may tick at any cadence.

use std::time::{Duration, Instant};

use crate::{GridError, GridState, InvalidConfig, Polarity};

#[derive(Debug, Clone, Copy)]
pub struct DecayModel {
    max_intensity: f32,
    duration: Duration,
}

impl DecayModel {
    /// Both constants must be strictly positive; a zero duration would divide
    /// by zero on the first tick, so it is rejected here instead.
    pub fn new(max_intensity: f32, duration: Duration) -> Result<Self, InvalidConfig> {
        if max_intensity <= 0.0 {
            return Err(InvalidConfig("max intensity must be positive"));
        }
        if duration.is_zero() {
            return Err(InvalidConfig("decay duration must be positive"));
        }
        Ok(DecayModel {
            max_intensity,
            duration,
        })
    }

    pub fn max_intensity(&self) -> f32 {
        self.max_intensity
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Starts an impulse: full intensity on the chosen channel, stamped with
    /// `now`. `Off` releases the cell immediately.
    pub fn activate(
        &self,
        grid: &mut GridState,
        row: usize,
        col: usize,
        polarity: Polarity,
        now: Instant,
    ) -> Result<(), GridError> {
        grid.set_cell(row, col, polarity, self.max_intensity)?;
        if polarity != Polarity::Off {
            grid.cell_mut(row, col)?.activated_at = Some(now);
        }
        Ok(())
    }

    /// Ages every stamped cell. Within the window the active channel is
    /// scaled as `max_intensity * (1 - elapsed/duration)`; once the window
    /// has passed the cell returns to rest and loses its stamp.
    pub fn tick(&self, grid: &mut GridState, now: Instant) {
        for cell in grid.cells_mut() {
            let Some(stamp) = cell.activated_at else {
                continue;
            };
            let elapsed = now.saturating_duration_since(stamp);
            if elapsed < self.duration {
                let scale = 1.0 - elapsed.as_secs_f32() / self.duration.as_secs_f32();
                if cell.positive > 0.0 {
                    cell.positive = self.max_intensity * scale;
                }
                if cell.negative > 0.0 {
                    cell.negative = self.max_intensity * scale;
                }
            } else {
                *cell = crate::Cell::default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_config() {
        assert!(DecayModel::new(0.0, Duration::from_millis(100)).is_err());
        assert!(DecayModel::new(-1.0, Duration::from_millis(100)).is_err());
        assert!(DecayModel::new(10.0, Duration::ZERO).is_err());
    }

    #[test]
    fn halfway_through_the_window_intensity_is_half() {
        let model = DecayModel::new(10.0, Duration::from_millis(100)).unwrap();
        let mut grid = GridState::new(4, 8).unwrap();
        let t0 = Instant::now();

        model
            .activate(&mut grid, 1, 2, Polarity::Negative, t0)
            .unwrap();
        assert_eq!(grid.get(1, 2).unwrap().negative, 10.0);

        model.tick(&mut grid, t0 + Duration::from_millis(50));
        let cell = grid.get(1, 2).unwrap();
        assert!((cell.negative - 5.0).abs() < 1e-3);
        assert_eq!(cell.positive, 0.0);
        assert!(cell.activated_at.is_some());
    }

    #[test]
    fn past_the_window_cell_is_at_rest_with_no_stamp() {
        let model = DecayModel::new(10.0, Duration::from_millis(100)).unwrap();
        let mut grid = GridState::new(4, 8).unwrap();
        let t0 = Instant::now();

        model
            .activate(&mut grid, 0, 0, Polarity::Positive, t0)
            .unwrap();
        model.tick(&mut grid, t0 + Duration::from_millis(200));
        let cell = grid.get(0, 0).unwrap();
        assert_eq!(cell.positive, 0.0);
        assert_eq!(cell.negative, 0.0);
        assert!(cell.activated_at.is_none());
    }

    #[test]
    fn cells_decay_independently() {
        let model = DecayModel::new(10.0, Duration::from_millis(100)).unwrap();
        let mut grid = GridState::new(4, 8).unwrap();
        let t0 = Instant::now();

        model
            .activate(&mut grid, 0, 0, Polarity::Positive, t0)
            .unwrap();
        model
            .activate(
                &mut grid,
                0,
                1,
                Polarity::Positive,
                t0 + Duration::from_millis(80),
            )
            .unwrap();

        model.tick(&mut grid, t0 + Duration::from_millis(120));
        assert!(grid.get(0, 0).unwrap().is_off());
        let late = grid.get(0, 1).unwrap();
        assert!((late.positive - 6.0).abs() < 1e-3);
    }

    #[test]
    fn unstamped_cells_are_untouched() {
        let model = DecayModel::new(10.0, Duration::from_millis(100)).unwrap();
        let mut grid = GridState::new(4, 8).unwrap();
        grid.set_cell(3, 3, Polarity::Negative, 7.0).unwrap();

        model.tick(&mut grid, Instant::now() + Duration::from_secs(10));
        assert_eq!(grid.get(3, 3).unwrap().negative, 7.0);
    }
}
