//! Correction modules and the contract they share.

pub mod dark;
pub mod reflectance;

pub use dark::{DarkCalibrationTable, DarkCurrentModule};
pub use reflectance::{reflectance, ReflectanceModule};

use scia_common::{ClusterRecord, Corrections};

use crate::context::{CorrectionContext, StateParams};
use crate::error::Result;

/// One step of the calibration chain.
///
/// Implementations only mutate `pixel_values`, skip records whose `applied`
/// mask already holds [`CorrectionModule::correction`], and prepare every
/// fallible input before touching a record.
pub trait CorrectionModule: Send {
    fn name(&self) -> &'static str;

    /// Bit set in `ClusterRecord::applied` once this module has run.
    fn correction(&self) -> Corrections;

    fn apply(
        &mut self,
        ctx: &CorrectionContext<'_>,
        params: &StateParams,
        records: &mut [ClusterRecord],
    ) -> Result<()>;
}
