//! External mean solar reference spectra.
//!
//! Used when the product carries no `SUN_REFERENCE` data set or when the
//! external spectra are requested explicitly.

use std::path::Path;

use l0_parser::SolarReferenceSpectrum;
use scia_common::SourceKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CalibrationError, Result};

/// Lookup of solar spectra by orbit and viewing geometry.
pub trait SolarSpectrumStore: Send + Sync {
    /// Spectrum of `kind` measured closest to `orbit`.
    fn nearest(&self, orbit: u16, kind: SourceKind) -> Option<SolarReferenceSpectrum>;
}

/// One stored spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSpectrum {
    pub orbit: u16,
    pub source_kind: SourceKind,
    pub spectrum: SolarReferenceSpectrum,
}

/// Spectra held in memory, loadable from YAML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemorySolarStore {
    #[serde(default)]
    pub spectra: Vec<StoredSpectrum>,
}

impl InMemorySolarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, orbit: u16, source_kind: SourceKind, spectrum: SolarReferenceSpectrum) {
        self.spectra.push(StoredSpectrum {
            orbit,
            source_kind,
            spectrum,
        });
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Load a store file; `.json` files are JSON, everything else YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let store: Self = if is_json {
            serde_json::from_str(&text).map_err(|e| CalibrationError::parse(path, e))?
        } else {
            serde_yaml::from_str(&text).map_err(|e| CalibrationError::parse(path, e))?
        };
        debug!(path = %path.display(), spectra = store.len(), "Loaded solar spectrum store");
        Ok(store)
    }
}

impl SolarSpectrumStore for InMemorySolarStore {
    fn nearest(&self, orbit: u16, kind: SourceKind) -> Option<SolarReferenceSpectrum> {
        self.spectra
            .iter()
            .filter(|s| s.source_kind == kind)
            // Ties go to the earlier orbit.
            .min_by_key(|s| ((s.orbit as i32 - orbit as i32).abs(), s.orbit))
            .map(|s| s.spectrum.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(doppler_shift: f32) -> SolarReferenceSpectrum {
        SolarReferenceSpectrum {
            wavelength: vec![300.0, 400.0],
            mean_irradiance: vec![1.0, 2.0],
            doppler_shift,
        }
    }

    #[test]
    fn test_nearest_orbit_per_kind() {
        let mut store = InMemorySolarStore::new();
        store.push(100, SourceKind::Nadir, spectrum(1.0));
        store.push(200, SourceKind::Nadir, spectrum(2.0));
        store.push(150, SourceKind::Limb, spectrum(3.0));

        assert_eq!(store.nearest(160, SourceKind::Nadir).unwrap().doppler_shift, 2.0);
        assert_eq!(store.nearest(140, SourceKind::Nadir).unwrap().doppler_shift, 1.0);
        assert_eq!(store.nearest(150, SourceKind::Nadir).unwrap().doppler_shift, 1.0);
        assert_eq!(store.nearest(0, SourceKind::Limb).unwrap().doppler_shift, 3.0);
        assert!(store.nearest(0, SourceKind::Occultation).is_none());
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sun.yaml");
        let yaml = "spectra:\n  - orbit: 10\n    source_kind: limb\n    spectrum:\n      wavelength: [1.0, 2.0]\n      mean_irradiance: [3.0, 4.0]\n      doppler_shift: 0.0\n";
        std::fs::write(&path, yaml).unwrap();

        let store = InMemorySolarStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.spectra[0].source_kind, SourceKind::Limb);
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sun.json");
        std::fs::write(&path, "{ \"spectra\": [").unwrap();

        match InMemorySolarStore::load(&path) {
            Err(CalibrationError::Parse { path: reported, .. }) => {
                assert!(reported.ends_with("sun.json"));
            }
            other => panic!("expected parse error, got {:?}", other.map(|s| s.len())),
        }
    }
}
