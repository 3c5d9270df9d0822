//! Providers of the calibration data sets a product embeds.

use std::sync::Arc;

use l0_parser::{
    LeakageConstant, Product, SolarReferenceSpectrum, SpectralCalibration, VariableDarkRecord,
};

use crate::error::Result;

/// File-level calibration inputs.
///
/// [`Product`] reads them from its data sets; [`StaticCalibration`] holds
/// them in memory.
pub trait CalibrationSource {
    fn leakage_constant(&self) -> Result<Option<LeakageConstant>>;
    fn leakage_variable(&self) -> Result<Vec<VariableDarkRecord>>;
    fn sun_reference(&self) -> Result<Option<SolarReferenceSpectrum>>;
    /// Wavelength of every science pixel.
    fn pixel_wavelength(&self) -> Result<Option<Arc<[f32]>>>;
}

impl CalibrationSource for Product {
    fn leakage_constant(&self) -> Result<Option<LeakageConstant>> {
        Ok(LeakageConstant::read(self)?)
    }

    fn leakage_variable(&self) -> Result<Vec<VariableDarkRecord>> {
        Ok(VariableDarkRecord::read_all(self)?)
    }

    fn sun_reference(&self) -> Result<Option<SolarReferenceSpectrum>> {
        Ok(SolarReferenceSpectrum::read(self)?)
    }

    fn pixel_wavelength(&self) -> Result<Option<Arc<[f32]>>> {
        Ok(SpectralCalibration::read(self)?.map(|s| Arc::from(s.wavelength)))
    }
}

/// In-memory calibration inputs.
#[derive(Debug, Clone, Default)]
pub struct StaticCalibration {
    pub leakage_constant: Option<LeakageConstant>,
    pub leakage_variable: Vec<VariableDarkRecord>,
    pub sun_reference: Option<SolarReferenceSpectrum>,
    pub pixel_wavelength: Option<Arc<[f32]>>,
}

impl CalibrationSource for StaticCalibration {
    fn leakage_constant(&self) -> Result<Option<LeakageConstant>> {
        Ok(self.leakage_constant.clone())
    }

    fn leakage_variable(&self) -> Result<Vec<VariableDarkRecord>> {
        Ok(self.leakage_variable.clone())
    }

    fn sun_reference(&self) -> Result<Option<SolarReferenceSpectrum>> {
        Ok(self.sun_reference.clone())
    }

    fn pixel_wavelength(&self) -> Result<Option<Arc<[f32]>>> {
        Ok(self.pixel_wavelength.clone())
    }
}
