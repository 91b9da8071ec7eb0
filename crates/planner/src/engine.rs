//! The herd-then-form state machine.
//!
//! Starting from the farthest distance band, the engine pulses contracting
//! concentric bands toward the target shape, then holds the shape steady.
//! All waiting is expressed as stored deadlines compared against a
//! caller-supplied `now`, so the caller may tick at any cadence and tests can
//! feed a synthetic clock.

use std::time::{Duration, Instant};

use coilbed_grid::{GridState, InvalidConfig, Polarity};

use crate::{DistanceField, PlanError, TargetMask};

/// Timing and drive parameters for one herding session.
#[derive(Debug, Clone, Copy)]
pub struct HerdConfig {
    /// Which channel band activation drives. `Off` is not a valid direction.
    pub direction: Polarity,
    /// Drive level for activated cells.
    pub max_intensity: f32,
    /// Time between band pulses.
    pub pulse_interval: Duration,
    /// When set, each pulse also activates the next band inward and holds
    /// the pair for this long.
    pub overlap_hold: Option<Duration>,
}

impl HerdConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.direction == Polarity::Off {
            return Err(InvalidConfig("herd direction must drive a channel"));
        }
        if self.max_intensity <= 0.0 {
            return Err(InvalidConfig("max intensity must be positive"));
        }
        if self.pulse_interval.is_zero() {
            return Err(InvalidConfig("pulse interval must be positive"));
        }
        if self.overlap_hold.is_some_and(|hold| hold.is_zero()) {
            return Err(InvalidConfig("overlap hold must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Herd,
    Form,
}

/// Drives a [`GridState`] through the herd-then-form sequence.
///
/// The engine owns the session state (phase, band index, deadlines); the
/// caller owns the grid and the clock. `Form` is held indefinitely once
/// entered; only [`stop`](Self::stop) followed by a fresh
/// [`start`](Self::start) re-runs the band sequence.
#[derive(Debug, Clone)]
pub struct HerdFormationEngine {
    mask: TargetMask,
    field: DistanceField,
    config: HerdConfig,
    phase: Phase,
    // Band currently on display; counts down to -1, at which point the
    // session switches to Form.
    band_k: i64,
    next_pulse_at: Option<Instant>,
    overlap_until: Option<Instant>,
}

impl HerdFormationEngine {
    /// Builds the distance field for `mask` and prepares an idle session.
    pub fn new(mask: TargetMask, config: HerdConfig) -> Result<Self, PlanError> {
        config.validate()?;
        if mask.is_empty() {
            return Err(PlanError::EmptyTarget);
        }
        let field = DistanceField::build(&mask);
        Ok(HerdFormationEngine {
            mask,
            field,
            config,
            phase: Phase::Idle,
            band_k: -1,
            next_pulse_at: None,
            overlap_until: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn field(&self) -> &DistanceField {
        &self.field
    }

    pub fn mask(&self) -> &TargetMask {
        &self.mask
    }

    /// Begins herding: activates the outermost band immediately and arms the
    /// pulse timer. Restarting an active session re-runs the sequence from
    /// the outermost band.
    pub fn start(&mut self, grid: &mut GridState, now: Instant) -> Result<(), PlanError> {
        self.field.matches(grid)?;
        self.phase = Phase::Herd;
        self.band_k = i64::from(self.field.max_distance());
        self.pulse(grid, now)?;
        Ok(())
    }

    /// Advances the session against the caller's clock. Safe to call at any
    /// cadence; nothing happens between deadlines.
    pub fn advance(&mut self, grid: &mut GridState, now: Instant) -> Result<(), PlanError> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::Herd => {
                // Checked before any mutation: a mismatched grid must not be
                // cleared or partially written, and the band index must not
                // advance.
                self.field.matches(grid)?;
                if self.next_pulse_at.is_some_and(|deadline| now >= deadline) {
                    self.band_k -= 1;
                    if self.band_k >= 0 {
                        self.pulse(grid, now)?;
                    } else {
                        self.enter_form(grid)?;
                    }
                } else if self.overlap_until.is_some_and(|until| now < until) {
                    // Re-assert the held pair. The pulse already wrote these
                    // cells and nothing clears them mid-interval, so this is
                    // idempotent.
                    self.activate_band(grid)?;
                }
                Ok(())
            }
            Phase::Form => self.activate_targets(grid),
        }
    }

    /// Clears the grid and returns to `Idle`, from any phase, synchronously.
    pub fn stop(&mut self, grid: &mut GridState) {
        grid.clear_all();
        self.phase = Phase::Idle;
        self.band_k = -1;
        self.next_pulse_at = None;
        self.overlap_until = None;
    }

    fn pulse(&mut self, grid: &mut GridState, now: Instant) -> Result<(), PlanError> {
        self.activate_band(grid)?;
        self.next_pulse_at = Some(now + self.config.pulse_interval);
        self.overlap_until = self.config.overlap_hold.map(|hold| now + hold);
        Ok(())
    }

    fn enter_form(&mut self, grid: &mut GridState) -> Result<(), PlanError> {
        self.phase = Phase::Form;
        self.next_pulse_at = None;
        self.overlap_until = None;
        self.activate_targets(grid)
    }

    // Full overwrite: every cell off except band k, plus band k-1 when the
    // overlap pair is configured.
    fn activate_band(&self, grid: &mut GridState) -> Result<(), PlanError> {
        let k = self.band_k as u32;
        grid.overwrite(self.field.band(k), self.config.direction, self.config.max_intensity)?;
        if self.config.overlap_hold.is_some() && k > 0 {
            for (row, col) in self.field.band(k - 1) {
                grid.set_cell(row, col, self.config.direction, self.config.max_intensity)?;
            }
        }
        Ok(())
    }

    fn activate_targets(&self, grid: &mut GridState) -> Result<(), PlanError> {
        self.field.matches(grid)?;
        grid.overwrite(self.mask.iter(), self.config.direction, self.config.max_intensity)?;
        Ok(())
    }
}
