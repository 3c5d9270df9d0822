//! Orbit-phase dependent calibration tables.
//!
//! Rows are tabulated at increasing orbit phases inside `[0, 1)`. The table
//! is closed over the orbit by wrap rows at phase 0 and 1 that blend
//! linearly between the last and the first tabulated row.

use super::InterpolationError;

/// Position of an orbit phase inside a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseBracket {
    /// Row with `phase[lo] <= orbit_phase < phase[lo + 1]`.
    pub lo: usize,
    /// `(orbit_phase - phase[lo]) / (phase[lo + 1] - phase[lo])`.
    pub fraction: f64,
}

/// Rows of equal length tabulated over orbit phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    phases: Vec<f64>,
    rows: Vec<Vec<f32>>,
}

impl PhaseTable {
    /// Build a table from rows in increasing phase order.
    ///
    /// Phase 0 and phase 1 wrap rows are added unless a row already sits
    /// exactly at phase 0.
    pub fn with_wrap(records: Vec<(f32, Vec<f32>)>) -> Result<Self, InterpolationError> {
        let Some(width) = records.first().map(|(_, row)| row.len()) else {
            return Err(InterpolationError::EmptyInput);
        };
        for (i, (phase, row)) in records.iter().enumerate() {
            if row.len() != width {
                return Err(InterpolationError::LengthMismatch {
                    x: width,
                    y: row.len(),
                });
            }
            let phase = *phase as f64;
            let in_range = (0.0..1.0).contains(&phase);
            let increasing = i == 0 || phase > records[i - 1].0 as f64;
            if !in_range || !increasing {
                return Err(InterpolationError::NotMonotonic { index: i });
            }
        }

        let first_phase = records[0].0 as f64;
        let last_phase = records[records.len() - 1].0 as f64;
        let first = &records[0].1;
        let last = &records[records.len() - 1].1;

        // Weight of the first row at the wrap point.
        let gap = 1.0 - last_phase + first_phase;
        let w = if gap > 0.0 { (1.0 - last_phase) / gap } else { 0.0 };
        let wrap: Vec<f32> = last
            .iter()
            .zip(first)
            .map(|(&l, &f)| ((1.0 - w) * l as f64 + w * f as f64) as f32)
            .collect();

        let mut phases = Vec::with_capacity(records.len() + 2);
        let mut rows = Vec::with_capacity(records.len() + 2);
        if first_phase > 0.0 {
            phases.push(0.0);
            rows.push(wrap.clone());
        }
        for (phase, row) in records {
            phases.push(phase as f64);
            rows.push(row);
        }
        phases.push(1.0);
        rows.push(wrap);

        Ok(Self { phases, rows })
    }

    /// Tabulated phases including the wrap rows.
    pub fn phases(&self) -> &[f64] {
        &self.phases
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bracket of `orbit_phase`, taken modulo 1.
    pub fn bracket(&self, orbit_phase: f64) -> Option<PhaseBracket> {
        if !orbit_phase.is_finite() || self.phases.len() < 2 {
            return None;
        }
        let phase = orbit_phase.rem_euclid(1.0);
        let last = self.phases.len() - 2;
        let lo = self
            .phases[..=last]
            .partition_point(|&p| p <= phase)
            .saturating_sub(1);
        let span = self.phases[lo + 1] - self.phases[lo];
        let fraction = if span > 0.0 {
            ((phase - self.phases[lo]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(PhaseBracket { lo, fraction })
    }

    /// Row blended linearly between the bracketing rows.
    pub fn interpolate(&self, orbit_phase: f64) -> Option<Vec<f32>> {
        let PhaseBracket { lo, fraction } = self.bracket(orbit_phase)?;
        let below = &self.rows[lo];
        let above = &self.rows[lo + 1];
        Some(
            below
                .iter()
                .zip(above)
                .map(|(&b, &a)| ((1.0 - fraction) * b as f64 + fraction * a as f64) as f32)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_rows_blend_across_orbit_end() {
        let table = PhaseTable::with_wrap(vec![(0.25, vec![2.0]), (0.75, vec![4.0])]).unwrap();
        assert_eq!(table.phases(), &[0.0, 0.25, 0.75, 1.0]);
        // Halfway between 0.75 and 1.25.
        assert_eq!(table.row(0), Some(&[3.0][..]));
        assert_eq!(table.row(3), Some(&[3.0][..]));
    }

    #[test]
    fn test_row_at_zero_is_not_duplicated() {
        let table = PhaseTable::with_wrap(vec![(0.0, vec![1.0]), (0.5, vec![3.0])]).unwrap();
        assert_eq!(table.phases(), &[0.0, 0.5, 1.0]);
        assert_eq!(table.row(2), Some(&[1.0][..]));
    }

    #[test]
    fn test_bracket_midpoint() {
        let table = PhaseTable::with_wrap(vec![(0.2, vec![1.0, 10.0]), (0.4, vec![3.0, 30.0])]).unwrap();
        let bracket = table.bracket(0.3).unwrap();
        assert_eq!(table.phases()[bracket.lo], 0.2f32 as f64);
        assert!((bracket.fraction - 0.5).abs() < 1e-6);

        let row = table.interpolate(0.3).unwrap();
        assert!((row[0] - 2.0).abs() < 1e-5);
        assert!((row[1] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_bracket_on_tabulated_phase() {
        let table = PhaseTable::with_wrap(vec![(0.25, vec![2.0]), (0.75, vec![4.0])]).unwrap();
        let bracket = table.bracket(0.25).unwrap();
        assert_eq!(bracket.lo, 1);
        assert_eq!(bracket.fraction, 0.0);
        assert_eq!(table.bracket(1.25), table.bracket(0.25));
        assert_eq!(table.bracket(0.9).unwrap().lo, 2);
    }

    #[test]
    fn test_single_row_is_constant() {
        let table = PhaseTable::with_wrap(vec![(0.6, vec![5.0])]).unwrap();
        assert_eq!(table.interpolate(0.1), Some(vec![5.0]));
        assert_eq!(table.interpolate(0.9), Some(vec![5.0]));
    }

    #[test]
    fn test_invalid_tables() {
        assert_eq!(PhaseTable::with_wrap(vec![]), Err(InterpolationError::EmptyInput));
        assert!(matches!(
            PhaseTable::with_wrap(vec![(0.5, vec![1.0]), (0.4, vec![1.0])]),
            Err(InterpolationError::NotMonotonic { index: 1 })
        ));
        assert!(matches!(
            PhaseTable::with_wrap(vec![(0.5, vec![1.0]), (0.7, vec![1.0, 2.0])]),
            Err(InterpolationError::LengthMismatch { .. })
        ));
        assert!(PhaseTable::with_wrap(vec![(1.5, vec![1.0])]).is_err());
    }
}
