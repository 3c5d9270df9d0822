//! Calibration data sets embedded in a product.
//!
//! All records are big-endian `f32` arrays over the 8192 science pixels
//! (or the 3072 pixels of channels 6-8 for the variable dark term).

use scia_common::{SCIENCE_PIXELS, VARIABLE_DARK_PIXELS};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::ByteCursor;
use crate::pds::{self, Product};
use crate::{L0Error, Result};

/// Constant dark calibration (`LEAKAGE_CONSTANT`).
#[derive(Debug, Clone, PartialEq)]
pub struct LeakageConstant {
    pub analog_offset: Vec<f32>,
    pub analog_offset_error: Vec<f32>,
    pub dark_current: Vec<f32>,
    pub dark_current_error: Vec<f32>,
    pub mean_noise: Vec<f32>,
}

impl LeakageConstant {
    pub const RECORD_SIZE: usize = 5 * SCIENCE_PIXELS * 4;

    pub fn decode(record: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(record).with_context("LEAKAGE_CONSTANT record");
        Ok(Self {
            analog_offset: cursor.read_f32_vec(SCIENCE_PIXELS)?,
            analog_offset_error: cursor.read_f32_vec(SCIENCE_PIXELS)?,
            dark_current: cursor.read_f32_vec(SCIENCE_PIXELS)?,
            dark_current_error: cursor.read_f32_vec(SCIENCE_PIXELS)?,
            mean_noise: cursor.read_f32_vec(SCIENCE_PIXELS)?,
        })
    }

    /// Read the first record of the data set; `None` if the product has none.
    pub fn read(product: &Product) -> Result<Option<Self>> {
        let Some(ds) = product.optional_dataset(pds::LEAKAGE_CONSTANT)? else {
            return Ok(None);
        };
        let first = ds.records()?.next();
        first.map(|record| Self::decode(&record)).transpose()
    }
}

/// One row of the orbit-phase dependent dark table (`LEAKAGE_VARIABLE`).
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDarkRecord {
    pub orbit_phase: f32,
    /// Dark current correction of channels 6-8.
    pub dark_current: Vec<f32>,
}

impl VariableDarkRecord {
    pub const RECORD_SIZE: usize = 4 + VARIABLE_DARK_PIXELS * 4;

    pub fn decode(record: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(record).with_context("LEAKAGE_VARIABLE record");
        Ok(Self {
            orbit_phase: cursor.read_f32()?,
            dark_current: cursor.read_f32_vec(VARIABLE_DARK_PIXELS)?,
        })
    }

    /// All records of the data set, in file order; empty if absent.
    pub fn read_all(product: &Product) -> Result<Vec<Self>> {
        let Some(ds) = product.optional_dataset(pds::LEAKAGE_VARIABLE)? else {
            return Ok(Vec::new());
        };
        let records = ds
            .records()?
            .map(|r| Self::decode(&r))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = records.len(), "Read variable dark records");
        Ok(records)
    }
}

/// Solar mean reference spectrum (`SUN_REFERENCE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarReferenceSpectrum {
    /// Wavelength per science pixel (nm).
    pub wavelength: Vec<f32>,
    pub mean_irradiance: Vec<f32>,
    pub doppler_shift: f32,
}

impl SolarReferenceSpectrum {
    pub const RECORD_SIZE: usize = 2 * SCIENCE_PIXELS * 4 + 4;

    pub fn decode(record: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(record).with_context("SUN_REFERENCE record");
        Ok(Self {
            wavelength: cursor.read_f32_vec(SCIENCE_PIXELS)?,
            mean_irradiance: cursor.read_f32_vec(SCIENCE_PIXELS)?,
            doppler_shift: cursor.read_f32()?,
        })
    }

    pub fn read(product: &Product) -> Result<Option<Self>> {
        let Some(ds) = product.optional_dataset(pds::SUN_REFERENCE)? else {
            return Ok(None);
        };
        let first = ds.records()?.next();
        first.map(|record| Self::decode(&record)).transpose()
    }

    /// Check that both arrays cover all science pixels.
    pub fn validate(&self) -> Result<()> {
        if self.wavelength.len() != SCIENCE_PIXELS || self.mean_irradiance.len() != SCIENCE_PIXELS {
            return Err(L0Error::invalid_format(format!(
                "solar spectrum has {} wavelengths and {} irradiances, expected {}",
                self.wavelength.len(),
                self.mean_irradiance.len(),
                SCIENCE_PIXELS
            )));
        }
        Ok(())
    }
}

/// Per-pixel wavelength grid (`SPECTRAL_CALIBRATION`).
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralCalibration {
    pub wavelength: Vec<f32>,
}

impl SpectralCalibration {
    pub const RECORD_SIZE: usize = SCIENCE_PIXELS * 4;

    pub fn decode(record: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(record).with_context("SPECTRAL_CALIBRATION record");
        Ok(Self {
            wavelength: cursor.read_f32_vec(SCIENCE_PIXELS)?,
        })
    }

    pub fn read(product: &Product) -> Result<Option<Self>> {
        let Some(ds) = product.optional_dataset(pds::SPECTRAL_CALIBRATION)? else {
            return Ok(None);
        };
        let first = ds.records()?.next();
        first.map(|record| Self::decode(&record)).transpose()
    }
}
