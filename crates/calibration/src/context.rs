//! Per-state inputs shared by all correction modules.

use std::sync::Arc;

use scia_common::{CalibrationFlags, Mjd, SourceKind};

use crate::source::CalibrationSource;

/// Scope information and calibration inputs for one module invocation.
///
/// The dirty flags are computed by the caller: `file_scope_dirty` is set for
/// the first state of each input file, `orbit_phase_scope_dirty` whenever the
/// orbit phase enters a new table bracket or runs backwards.
#[derive(Clone, Copy)]
pub struct CorrectionContext<'a> {
    pub flags: CalibrationFlags,
    pub file_scope_dirty: bool,
    pub orbit_phase_scope_dirty: bool,
    pub orbit_phase: f32,
    pub source_kind: SourceKind,
    pub source: &'a dyn CalibrationSource,
}

impl std::fmt::Debug for CorrectionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionContext")
            .field("flags", &self.flags)
            .field("file_scope_dirty", &self.file_scope_dirty)
            .field("orbit_phase_scope_dirty", &self.orbit_phase_scope_dirty)
            .field("orbit_phase", &self.orbit_phase)
            .field("source_kind", &self.source_kind)
            .finish_non_exhaustive()
    }
}

/// Description of the state being calibrated.
#[derive(Debug, Clone, PartialEq)]
pub struct StateParams {
    pub state_id: u8,
    pub orbit: u16,
    pub orbit_phase: f32,
    pub source_kind: SourceKind,
    pub timestamp: Mjd,
    pub solar_zenith_deg: f32,
    /// Wavelength per science pixel; empty when the product has none.
    pub pixel_wavelength: Arc<[f32]>,
}

/// Tracks which calibration-table bracket the orbit phase is in.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    boundaries: Vec<f64>,
    last_phase: Option<f64>,
    last_bracket: Option<usize>,
}

impl PhaseTracker {
    /// `boundaries` are the tabulated phases, ascending.
    pub fn new(boundaries: Vec<f64>) -> Self {
        Self {
            boundaries,
            last_phase: None,
            last_bracket: None,
        }
    }

    fn bracket_of(&self, phase: f64) -> usize {
        self.boundaries.partition_point(|&b| b <= phase)
    }

    /// Record the next state's phase; returns whether the phase scope is dirty.
    pub fn update(&mut self, orbit_phase: f32) -> bool {
        let phase = orbit_phase as f64;
        let bracket = self.bracket_of(phase);
        let dirty = match (self.last_phase, self.last_bracket) {
            (Some(last), Some(last_bracket)) => phase < last || bracket != last_bracket,
            _ => true,
        };
        self.last_phase = Some(phase);
        self.last_bracket = Some(bracket);
        dirty
    }

    /// Forget the last phase so that the next update is dirty.
    pub fn reset(&mut self) {
        self.last_phase = None;
        self.last_bracket = None;
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new(vec![0.0, 1.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_is_dirty() {
        let mut tracker = PhaseTracker::default();
        assert!(tracker.update(0.3));
        assert!(!tracker.update(0.4));
    }

    #[test]
    fn test_bracket_change_is_dirty() {
        let mut tracker = PhaseTracker::new(vec![0.0, 0.2, 0.4, 1.0]);
        assert!(tracker.update(0.1));
        assert!(!tracker.update(0.15));
        assert!(tracker.update(0.25));
        assert!(!tracker.update(0.39));
        assert!(tracker.update(0.4));
    }

    #[test]
    fn test_regression_is_dirty() {
        let mut tracker = PhaseTracker::new(vec![0.0, 0.5, 1.0]);
        assert!(tracker.update(0.3));
        assert!(tracker.update(0.2));
        tracker.reset();
        assert!(tracker.update(0.2));
    }
}
