//! Dark-current correction.
//!
//! `signal -= coadd_factor * analog_offset + integration_time * dark_current`
//! per pixel. The constant table comes from `LEAKAGE_CONSTANT`; channels 6-8
//! add an orbit-phase dependent term from `LEAKAGE_VARIABLE`. Limb states
//! instead subtract a dark level measured at the end of the limb scan.

use scia_common::{
    CalibrationFlags, ClusterRecord, Corrections, SourceKind, FIRST_IR_CHANNEL, CHANNEL_SIZE,
    SCIENCE_PIXELS, VARIABLE_DARK_PIXELS,
};
use tracing::{debug, warn};

use super::CorrectionModule;
use crate::context::{CorrectionContext, StateParams};
use crate::error::{CalibrationError, Result};
use crate::interpolation::PhaseTable;

/// Limb state whose dark readouts are at the start of the scan.
pub const LIMB_HEAD_DARK_STATE: u8 = 33;
/// Default length of the limb dark window.
pub const DEFAULT_LIMB_DARK_SECONDS: f32 = 1.5;

const VARIABLE_OFFSET: usize = (FIRST_IR_CHANNEL as usize - 1) * CHANNEL_SIZE;

/// Constant dark calibration for all science pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DarkCalibrationTable {
    pub analog_offset: Vec<f32>,
    pub analog_offset_error: Vec<f32>,
    pub dark_current: Vec<f32>,
    pub dark_current_error: Vec<f32>,
    pub mean_noise: Vec<f32>,
}

impl DarkCalibrationTable {
    pub fn zeros() -> Self {
        Self {
            analog_offset: vec![0.0; SCIENCE_PIXELS],
            analog_offset_error: vec![0.0; SCIENCE_PIXELS],
            dark_current: vec![0.0; SCIENCE_PIXELS],
            dark_current_error: vec![0.0; SCIENCE_PIXELS],
            mean_noise: vec![0.0; SCIENCE_PIXELS],
        }
    }

    fn from_leakage(leakage: l0_parser::LeakageConstant) -> Result<Self> {
        let table = Self {
            analog_offset: leakage.analog_offset,
            analog_offset_error: leakage.analog_offset_error,
            dark_current: leakage.dark_current,
            dark_current_error: leakage.dark_current_error,
            mean_noise: leakage.mean_noise,
        };
        if table.analog_offset.len() != SCIENCE_PIXELS || table.dark_current.len() != SCIENCE_PIXELS {
            return Err(CalibrationError::missing("LEAKAGE_CONSTANT does not cover all pixels"));
        }
        Ok(table)
    }
}

/// Dark-current correction module.
#[derive(Debug, Clone)]
pub struct DarkCurrentModule {
    constant: DarkCalibrationTable,
    /// Constant dark current plus the variable term of the current bracket.
    effective_dark: Vec<f32>,
    variable: Option<PhaseTable>,
    loaded: bool,
    limb_window_seconds: f32,
}

impl Default for DarkCurrentModule {
    fn default() -> Self {
        Self::new(DEFAULT_LIMB_DARK_SECONDS)
    }
}

impl DarkCurrentModule {
    pub fn new(limb_window_seconds: f32) -> Self {
        let constant = DarkCalibrationTable::zeros();
        Self {
            effective_dark: constant.dark_current.clone(),
            constant,
            variable: None,
            loaded: false,
            limb_window_seconds,
        }
    }

    /// Constant table as loaded for the current file.
    pub fn constant_table(&self) -> &DarkCalibrationTable {
        &self.constant
    }

    /// Dark current applied to non-limb states.
    pub fn effective_dark_current(&self) -> &[f32] {
        &self.effective_dark
    }

    fn reload_file_scope(&mut self, ctx: &CorrectionContext<'_>) -> Result<()> {
        let mut constant = match ctx.source.leakage_constant()? {
            Some(leakage) => DarkCalibrationTable::from_leakage(leakage)?,
            None => {
                warn!("LEAKAGE_CONSTANT absent, using a zero dark table");
                DarkCalibrationTable::zeros()
            }
        };
        if !ctx.flags.contains(CalibrationFlags::ANALOG_OFFSET) {
            constant.analog_offset.fill(0.0);
        }
        if !ctx.flags.contains(CalibrationFlags::DARK_CURRENT) {
            constant.dark_current.fill(0.0);
        }

        let variable = if ctx.flags.variable_dark_enabled() {
            let rows: Vec<(f32, Vec<f32>)> = ctx
                .source
                .leakage_variable()?
                .into_iter()
                .map(|r| (r.orbit_phase, r.dark_current))
                .collect();
            if rows.is_empty() {
                warn!("LEAKAGE_VARIABLE absent, skipping the variable dark term");
                None
            } else if rows[0].1.len() != VARIABLE_DARK_PIXELS {
                return Err(CalibrationError::missing(
                    "LEAKAGE_VARIABLE does not cover channels 6-8",
                ));
            } else {
                Some(PhaseTable::with_wrap(rows)?)
            }
        } else {
            None
        };

        debug!(
            variable_rows = variable.as_ref().map(PhaseTable::len).unwrap_or(0),
            "Loaded dark calibration"
        );
        self.effective_dark = constant.dark_current.clone();
        self.constant = constant;
        self.variable = variable;
        self.loaded = true;
        Ok(())
    }

    fn refresh_variable_term(&mut self, orbit_phase: f32) {
        let Some(table) = &self.variable else {
            return;
        };
        let Some(term) = table.interpolate(orbit_phase as f64) else {
            return;
        };
        self.effective_dark.copy_from_slice(&self.constant.dark_current);
        for (dark, add) in self.effective_dark[VARIABLE_OFFSET..].iter_mut().zip(&term) {
            *dark += add;
        }
        debug!(orbit_phase, "Refreshed variable dark term");
    }

    fn subtract_table(&self, record: &mut ClusterRecord) {
        let coadd = record.coadd_factor.max(1) as f32;
        let tint = record.integration_time;
        let correction: Vec<f32> = record
            .pixel_ids
            .iter()
            .map(|&p| coadd * self.constant.analog_offset[p as usize] + tint * self.effective_dark[p as usize])
            .collect();
        for observation in record.observations_mut() {
            for (value, corr) in observation.iter_mut().zip(&correction) {
                *value -= corr;
            }
        }
    }

    /// Number of readouts in the limb dark window.
    fn limb_window(&self, record: &ClusterRecord) -> usize {
        let n = if record.integration_time > 0.0 {
            (self.limb_window_seconds / record.integration_time).ceil() as usize
        } else {
            1
        };
        n.clamp(1, record.num_observations.max(1))
    }

    fn subtract_limb_dark(&self, state_id: u8, record: &mut ClusterRecord) {
        let num_obs = record.num_observations;
        let num_pixels = record.num_pixels;
        if num_obs == 0 || num_pixels == 0 {
            return;
        }
        let n = self.limb_window(record);
        let window = if state_id == LIMB_HEAD_DARK_STATE {
            0..n
        } else {
            num_obs - n..num_obs
        };

        let mut mean = vec![0.0f64; num_pixels];
        for obs in window {
            let values = &record.pixel_values[obs * num_pixels..(obs + 1) * num_pixels];
            for (m, &v) in mean.iter_mut().zip(values) {
                *m += v as f64;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        for observation in record.observations_mut() {
            for (value, m) in observation.iter_mut().zip(&mean) {
                *value = (*value as f64 - m) as f32;
            }
        }
    }
}

impl CorrectionModule for DarkCurrentModule {
    fn name(&self) -> &'static str {
        "dark_current"
    }

    fn correction(&self) -> Corrections {
        Corrections::DARK
    }

    fn apply(
        &mut self,
        ctx: &CorrectionContext<'_>,
        params: &StateParams,
        records: &mut [ClusterRecord],
    ) -> Result<()> {
        if !ctx.flags.intersects(CalibrationFlags::DARK) {
            return Ok(());
        }

        let reloaded = ctx.file_scope_dirty || !self.loaded;
        if reloaded {
            self.reload_file_scope(ctx)?;
        }
        if reloaded || ctx.orbit_phase_scope_dirty {
            self.refresh_variable_term(ctx.orbit_phase);
        }

        if let Some(bad) = records
            .iter()
            .flat_map(|r| r.pixel_ids.iter())
            .find(|&&p| p as usize >= SCIENCE_PIXELS)
        {
            return Err(CalibrationError::missing(format!(
                "no dark calibration for pixel {}",
                bad
            )));
        }

        for record in records.iter_mut() {
            if record.applied.contains(Corrections::DARK) {
                continue;
            }
            if ctx.source_kind == SourceKind::Limb {
                self.subtract_limb_dark(params.state_id, record);
            } else {
                self.subtract_table(record);
            }
            record.applied |= Corrections::DARK;
        }
        Ok(())
    }
}
