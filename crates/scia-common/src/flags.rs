//! Calibration option and applied-correction bit sets.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Calibration options requested for a processing run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CalibrationFlags: u32 {
        /// Subtract the analog offset (fixed pattern noise).
        const ANALOG_OFFSET = 1 << 0;
        /// Subtract the constant dark current.
        const DARK_CURRENT = 1 << 1;
        /// Add the orbit-phase dependent dark term (channels 6-8).
        const VARIABLE_DARK = 1 << 2;
        /// Divide by the solar reference spectrum.
        const REFLECTANCE = 1 << 3;
        /// Doppler-correct the solar reference grid for nadir states.
        const DOPPLER = 1 << 4;
        /// Prefer the external mean solar spectrum store.
        const SUN_EXTERNAL = 1 << 5;

        const DARK = Self::ANALOG_OFFSET.bits() | Self::DARK_CURRENT.bits() | Self::VARIABLE_DARK.bits();
    }
}

impl Default for CalibrationFlags {
    fn default() -> Self {
        Self::DARK | Self::REFLECTANCE | Self::DOPPLER
    }
}

impl CalibrationFlags {
    /// Parse a comma separated list of option names (case-insensitive).
    ///
    /// Unknown names are returned as the error value.
    pub fn parse_list(s: &str) -> Result<Self, String> {
        let mut flags = Self::empty();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            flags |= match name.to_lowercase().as_str() {
                "ao" | "analog_offset" => Self::ANALOG_OFFSET,
                "dark" | "dark_current" => Self::DARK_CURRENT,
                "vdark" | "variable_dark" => Self::VARIABLE_DARK,
                "refl" | "reflectance" => Self::REFLECTANCE,
                "doppler" => Self::DOPPLER,
                "sun_external" => Self::SUN_EXTERNAL,
                "all_dark" => Self::DARK,
                _ => return Err(name.to_string()),
            };
        }
        Ok(flags)
    }

    /// Variable dark needs the constant dark term to be enabled as well.
    pub fn variable_dark_enabled(&self) -> bool {
        self.contains(Self::DARK_CURRENT | Self::VARIABLE_DARK)
    }
}

bitflags! {
    /// Corrections that have been applied to a cluster record.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Corrections: u8 {
        const DARK = 1 << 0;
        const REFLECTANCE = 1 << 1;
    }
}
