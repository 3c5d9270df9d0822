//! Calibration and processing configuration.

use std::path::{Path, PathBuf};

use cluster_config::ResolverConfig;
use l0_parser::StateTimingTable;
use scia_common::{CalibrationFlags, Mjd};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CalibrationError, Result};
use crate::modules::dark::DEFAULT_LIMB_DARK_SECONDS;

/// Nominal ENVISAT orbital period in seconds.
pub const ORBITAL_PERIOD_SECONDS: f64 = 6035.928;

/// Configuration of the correction chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Requested corrections.
    pub flags: CalibrationFlags,

    /// Length of the limb dark window in seconds.
    pub limb_dark_seconds: f32,

    /// External solar spectrum store (YAML or JSON).
    pub solar_store_path: Option<PathBuf>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            flags: CalibrationFlags::default(),
            limb_dark_seconds: DEFAULT_LIMB_DARK_SECONDS,
            solar_store_path: None,
        }
    }
}

impl CalibrationConfig {
    /// Load configuration from environment variables.
    ///
    /// `SCIA_CALIBRATION` is a comma separated option list such as
    /// `ao,dark,vdark,refl`; a list with an unknown name is logged and the
    /// default flags are kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCIA_CALIBRATION") {
            if let Some(flags) = flags_from_env_value(&val) {
                config.flags = flags;
            }
        }

        if let Ok(val) = std::env::var("SCIA_LIMB_DARK_SECONDS") {
            match val.parse() {
                Ok(seconds) => config.limb_dark_seconds = seconds,
                Err(_) => warn!(value = %val, "Ignoring invalid SCIA_LIMB_DARK_SECONDS"),
            }
        }

        if let Ok(val) = std::env::var("SCIA_SOLAR_STORE") {
            config.solar_store_path = Some(PathBuf::from(val));
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.limb_dark_seconds > 0.0) {
            return Err("limb_dark_seconds must be > 0".to_string());
        }
        if self.flags.contains(CalibrationFlags::SUN_EXTERNAL) && self.solar_store_path.is_none() {
            return Err("sun_external requires solar_store_path".to_string());
        }
        Ok(())
    }
}

fn flags_from_env_value(val: &str) -> Option<CalibrationFlags> {
    match CalibrationFlags::parse_list(val) {
        Ok(flags) => Some(flags),
        Err(name) => {
            warn!(value = %val, unknown = %name, "Ignoring invalid SCIA_CALIBRATION");
            None
        }
    }
}

/// Stand-in orbit geometry used when no geolocation is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Ascending node crossing; the first state of each file when unset.
    pub ascending_node: Option<Mjd>,

    pub orbital_period_s: f64,

    /// Solar zenith angle assigned to every state, degrees.
    pub solar_zenith_deg: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            ascending_node: None,
            orbital_period_s: ORBITAL_PERIOD_SECONDS,
            solar_zenith_deg: 45.0,
        }
    }
}

/// Top-level processor configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub calibration: CalibrationConfig,
    pub resolver: ResolverConfig,
    pub geometry: GeometryConfig,

    /// Per-state timing offsets in 1/256 s, one per state id.
    pub state_timing: StateTimingTable,

    /// Worker threads for multi-file runs; 0 uses one per core.
    pub threads: usize,
}

impl ProcessorConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&text).map_err(|e| CalibrationError::parse(path.as_ref(), e))
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            calibration: CalibrationConfig::from_env(),
            resolver: ResolverConfig::from_env(),
            ..Default::default()
        };

        if let Ok(val) = std::env::var("SCIA_ORBITAL_PERIOD") {
            if let Ok(period) = val.parse() {
                config.geometry.orbital_period_s = period;
            }
        }

        if let Ok(val) = std::env::var("SCIA_SOLAR_ZENITH") {
            if let Ok(sza) = val.parse() {
                config.geometry.solar_zenith_deg = sza;
            }
        }

        if let Ok(val) = std::env::var("SCIA_THREADS") {
            if let Ok(threads) = val.parse() {
                config.threads = threads;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.calibration.validate()?;
        self.resolver.validate()?;
        if !(self.geometry.orbital_period_s > 0.0) {
            return Err("orbital_period_s must be > 0".to_string());
        }
        if self.resolver.store_path.is_none() {
            return Err("resolver.store_path is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_calibration_config() {
        let config = CalibrationConfig::default();
        assert!(config.flags.contains(CalibrationFlags::DARK_CURRENT));
        assert!(config.flags.contains(CalibrationFlags::REFLECTANCE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_flag_list() {
        assert_eq!(
            flags_from_env_value("ao, dark"),
            Some(CalibrationFlags::ANALOG_OFFSET | CalibrationFlags::DARK_CURRENT)
        );
        assert_eq!(flags_from_env_value("ao,bogus"), None);
    }

    #[test]
    fn test_sun_external_needs_store() {
        let mut config = CalibrationConfig {
            flags: CalibrationFlags::REFLECTANCE | CalibrationFlags::SUN_EXTERNAL,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.solar_store_path = Some(PathBuf::from("sun.yaml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_processor_config_requires_store() {
        let mut config = ProcessorConfig::default();
        assert!(config.validate().is_err());
        config.resolver.store_path = Some(PathBuf::from("clusters.yaml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = ProcessorConfig::default();
        config.threads = 3;
        config.geometry.solar_zenith_deg = 60.0;
        let text = serde_yaml::to_string(&config).unwrap();
        let parsed: ProcessorConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_state_timing_from_yaml() {
        let ticks: Vec<String> = (0..70).map(|i| i.to_string()).collect();
        let text = format!("state_timing: [{}]\n", ticks.join(", "));
        let parsed: ProcessorConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed.state_timing.offset_seconds(64), Some(0.25));

        assert!(serde_yaml::from_str::<ProcessorConfig>("state_timing: [1, 2]\n").is_err());
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processor.yaml");
        std::fs::write(&path, "threads: [not a number\n").unwrap();
        assert!(matches!(
            ProcessorConfig::from_yaml(&path),
            Err(CalibrationError::Parse { .. })
        ));
    }

    #[test]
    fn test_partial_yaml() {
        let parsed: ProcessorConfig =
            serde_yaml::from_str("threads: 2\ngeometry:\n  solar_zenith_deg: 30.0\n").unwrap();
        assert_eq!(parsed.threads, 2);
        assert_eq!(parsed.geometry.solar_zenith_deg, 30.0);
        assert_eq!(parsed.geometry.orbital_period_s, ORBITAL_PERIOD_SECONDS);
        assert_eq!(parsed.calibration, CalibrationConfig::default());
        assert_eq!(parsed.state_timing, StateTimingTable::default());
    }
}
