//! Radiance to reflectance normalization.
//!
//! Each cluster is divided by the solar mean reference spectrum resampled
//! onto the cluster's pixel wavelengths with an Akima fit of the channel's
//! reference grid:
//!
//! - nadir: `r = pi * signal / (cos(sza) * reference)`
//! - limb, occultation, monitor: `r = pi * signal / reference`

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use l0_parser::SolarReferenceSpectrum;
use scia_common::{
    channel_pixel_range, CalibrationFlags, ClusterRecord, Corrections, SourceKind, SCIENCE_PIXELS,
};
use tracing::{debug, warn};

use super::CorrectionModule;
use crate::context::{CorrectionContext, StateParams};
use crate::error::{CalibrationError, Result};
use crate::interpolation::{evaluate, fit, AkimaCoeffs};
use crate::solar_store::SolarSpectrumStore;

/// References below this are treated as missing.
pub const MIN_REFERENCE: f64 = 1e-14;
/// Doppler shift scale of the reference grid.
const DOPPLER_SCALE: f64 = 500.0;

/// Reflectance of one sample; NaN for unusable inputs.
///
/// `cos_sza` is `None` for geometries without a solar zenith term.
pub fn reflectance(signal: f32, reference: f64, cos_sza: Option<f64>) -> f32 {
    if !signal.is_finite() || signal.is_subnormal() {
        return f32::NAN;
    }
    if !reference.is_finite() || reference < MIN_REFERENCE {
        return f32::NAN;
    }
    let denominator = match cos_sza {
        Some(c) if c > 0.0 => c * reference,
        Some(_) => return f32::NAN,
        None => reference,
    };
    (PI * signal as f64 / denominator) as f32
}

/// Where the loaded reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceOrigin {
    Product,
    External(SourceKind),
}

/// Reflectance module.
pub struct ReflectanceModule {
    store: Option<Arc<dyn SolarSpectrumStore>>,
    reference: Option<(ReferenceOrigin, SolarReferenceSpectrum)>,
    /// Fits per (channel, doppler corrected) for the loaded reference.
    fits: HashMap<(u8, bool), Arc<AkimaCoeffs>>,
}

impl Default for ReflectanceModule {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ReflectanceModule {
    pub fn new(store: Option<Arc<dyn SolarSpectrumStore>>) -> Self {
        Self {
            store,
            reference: None,
            fits: HashMap::new(),
        }
    }

    fn external(&self, orbit: u16, kind: SourceKind) -> Option<(ReferenceOrigin, SolarReferenceSpectrum)> {
        self.store
            .as_ref()
            .and_then(|s| s.nearest(orbit, kind))
            .map(|spectrum| (ReferenceOrigin::External(kind), spectrum))
    }

    /// Make sure the reference for this state is loaded.
    fn ensure_reference(&mut self, ctx: &CorrectionContext<'_>, params: &StateParams) -> Result<()> {
        let use_external = ctx.flags.contains(CalibrationFlags::SUN_EXTERNAL);
        let current = self.reference.as_ref().map(|(origin, _)| *origin);
        let up_to_date = match current {
            None => false,
            Some(ReferenceOrigin::Product) => !ctx.file_scope_dirty && !use_external,
            Some(ReferenceOrigin::External(kind)) => !ctx.file_scope_dirty && kind == ctx.source_kind,
        };
        if up_to_date {
            return Ok(());
        }

        let loaded = if use_external {
            self.external(params.orbit, ctx.source_kind)
        } else {
            match ctx.source.sun_reference()? {
                Some(spectrum) => Some((ReferenceOrigin::Product, spectrum)),
                None => {
                    warn!(
                        orbit = params.orbit,
                        source_kind = %ctx.source_kind,
                        "SUN_REFERENCE absent, trying the external solar store"
                    );
                    self.external(params.orbit, ctx.source_kind)
                }
            }
        };
        let Some((origin, spectrum)) = loaded else {
            return Err(CalibrationError::missing(format!(
                "no solar reference for orbit {} ({})",
                params.orbit, ctx.source_kind
            )));
        };
        spectrum.validate()?;

        debug!(?origin, doppler_shift = spectrum.doppler_shift, "Loaded solar reference");
        self.reference = Some((origin, spectrum));
        self.fits.clear();
        Ok(())
    }

    /// Akima fit of one channel's reference grid.
    fn channel_fit(&mut self, channel_id: u8, doppler: bool) -> Result<Arc<AkimaCoeffs>> {
        if let Some(coeffs) = self.fits.get(&(channel_id, doppler)) {
            return Ok(Arc::clone(coeffs));
        }
        let Some((_, spectrum)) = &self.reference else {
            return Err(CalibrationError::missing("solar reference not loaded"));
        };
        let range = channel_pixel_range(channel_id)
            .ok_or_else(|| CalibrationError::missing(format!("channel {}", channel_id)))?;

        let scale = if doppler {
            1.0 + spectrum.doppler_shift as f64 / DOPPLER_SCALE
        } else {
            1.0
        };
        let mut pairs: Vec<(f64, f64)> = spectrum.wavelength[range.clone()]
            .iter()
            .zip(&spectrum.mean_irradiance[range])
            .filter(|(w, v)| w.is_finite() && v.is_finite())
            .map(|(&w, &v)| (w as f64 * scale, v as f64))
            .collect();
        if pairs.len() > 1 && pairs[0].0 > pairs[pairs.len() - 1].0 {
            pairs.reverse();
        }
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();

        let coeffs = Arc::new(fit(&x, &y)?);
        debug!(channel_id, doppler, knots = x.len(), "Fitted solar reference");
        self.fits.insert((channel_id, doppler), Arc::clone(&coeffs));
        Ok(coeffs)
    }

    /// Reference resampled onto every pixel of `record`.
    fn resample(&mut self, record: &ClusterRecord, wavelength: &[f32], doppler: bool) -> Result<Vec<f64>> {
        let points = record
            .pixel_ids
            .iter()
            .map(|&p| {
                wavelength.get(p as usize).map(|&w| w as f64).ok_or_else(|| {
                    CalibrationError::missing(format!("no wavelength for pixel {}", p))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let coeffs = self.channel_fit(record.channel_id, doppler)?;
        Ok(evaluate(&coeffs, &points))
    }
}

impl CorrectionModule for ReflectanceModule {
    fn name(&self) -> &'static str {
        "reflectance"
    }

    fn correction(&self) -> Corrections {
        Corrections::REFLECTANCE
    }

    fn apply(
        &mut self,
        ctx: &CorrectionContext<'_>,
        params: &StateParams,
        records: &mut [ClusterRecord],
    ) -> Result<()> {
        if !ctx.flags.contains(CalibrationFlags::REFLECTANCE) {
            return Ok(());
        }
        if params.pixel_wavelength.len() != SCIENCE_PIXELS {
            return Err(CalibrationError::missing("pixel wavelengths"));
        }
        self.ensure_reference(ctx, params)?;

        let nadir = ctx.source_kind == SourceKind::Nadir;
        let doppler = nadir && ctx.flags.contains(CalibrationFlags::DOPPLER);
        let cos_sza = nadir.then(|| (params.solar_zenith_deg as f64).to_radians().cos());

        let mut references = Vec::with_capacity(records.len());
        for record in records.iter() {
            if record.applied.contains(Corrections::REFLECTANCE) {
                references.push(None);
            } else {
                references.push(Some(self.resample(record, &params.pixel_wavelength, doppler)?));
            }
        }

        for (record, reference) in records.iter_mut().zip(references) {
            let Some(reference) = reference else {
                continue;
            };
            for observation in record.observations_mut() {
                for (value, &refl) in observation.iter_mut().zip(&reference) {
                    *value = reflectance(*value, refl, cos_sza);
                }
            }
            record.applied |= Corrections::REFLECTANCE;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solar_store::InMemorySolarStore;
    use crate::source::StaticCalibration;
    use scia_common::Mjd;
    use test_utils::wavelength_grid;

    fn flat_reference(level: f32) -> SolarReferenceSpectrum {
        SolarReferenceSpectrum {
            wavelength: wavelength_grid(),
            mean_irradiance: vec![level; SCIENCE_PIXELS],
            doppler_shift: 0.0,
        }
    }

    fn limb_record(values: Vec<f32>) -> ClusterRecord {
        ClusterRecord {
            channel_id: 1,
            cluster_id: 0,
            timestamp: Mjd::default(),
            integration_time: 1.0,
            coadd_factor: 1,
            num_observations: 1,
            num_pixels: values.len(),
            pixel_ids: (0..values.len() as u16).collect(),
            pixel_values: values,
            applied: Corrections::empty(),
        }
    }

    fn limb_params(wavelength: Vec<f32>) -> StateParams {
        StateParams {
            state_id: 28,
            orbit: 1200,
            orbit_phase: 0.0,
            source_kind: SourceKind::Limb,
            timestamp: Mjd::default(),
            solar_zenith_deg: 0.0,
            pixel_wavelength: Arc::from(wavelength),
        }
    }

    fn limb_ctx(source: &StaticCalibration, flags: CalibrationFlags) -> CorrectionContext<'_> {
        CorrectionContext {
            flags,
            file_scope_dirty: true,
            orbit_phase_scope_dirty: false,
            orbit_phase: 0.0,
            source_kind: SourceKind::Limb,
            source,
        }
    }

    #[test]
    fn test_product_reference_for_limb() {
        let source = StaticCalibration {
            sun_reference: Some(flat_reference(1.0)),
            ..Default::default()
        };
        let mut module = ReflectanceModule::default();
        let mut records = vec![limb_record(vec![1.0, 2.0])];
        module
            .apply(
                &limb_ctx(&source, CalibrationFlags::REFLECTANCE),
                &limb_params(wavelength_grid()),
                &mut records,
            )
            .unwrap();
        assert!((records[0].pixel_values[0] as f64 - PI).abs() < 1e-5);
        assert!((records[0].pixel_values[1] as f64 - 2.0 * PI).abs() < 1e-5);
        assert!(records[0].applied.contains(Corrections::REFLECTANCE));

        // a second run leaves corrected records alone
        let before = records.clone();
        module
            .apply(
                &limb_ctx(&source, CalibrationFlags::REFLECTANCE),
                &limb_params(wavelength_grid()),
                &mut records,
            )
            .unwrap();
        assert_eq!(records, before);
    }

    #[test]
    fn test_external_reference_preferred_when_requested() {
        let source = StaticCalibration {
            sun_reference: Some(flat_reference(1.0)),
            ..Default::default()
        };
        let mut store = InMemorySolarStore::new();
        store.push(1100, SourceKind::Limb, flat_reference(2.0));
        let mut module = ReflectanceModule::new(Some(Arc::new(store)));

        let mut records = vec![limb_record(vec![2.0])];
        module
            .apply(
                &limb_ctx(&source, CalibrationFlags::REFLECTANCE | CalibrationFlags::SUN_EXTERNAL),
                &limb_params(wavelength_grid()),
                &mut records,
            )
            .unwrap();
        assert!((records[0].pixel_values[0] as f64 - PI).abs() < 1e-5);
    }

    #[test]
    fn test_missing_inputs_leave_records_untouched() {
        let source = StaticCalibration::default();
        let mut module = ReflectanceModule::default();
        let mut records = vec![limb_record(vec![2.0])];

        let err = module
            .apply(
                &limb_ctx(&source, CalibrationFlags::REFLECTANCE),
                &limb_params(wavelength_grid()),
                &mut records,
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::MissingData(_)));

        let err = module
            .apply(
                &limb_ctx(&source, CalibrationFlags::REFLECTANCE),
                &limb_params(Vec::new()),
                &mut records,
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::MissingData(_)));
        assert_eq!(records[0].pixel_values, vec![2.0]);
        assert!(records[0].applied.is_empty());
    }

    #[test]
    fn test_reflectance_values() {
        let r = reflectance(2.0, 4.0, None);
        assert!((r as f64 - PI / 2.0).abs() < 1e-6);
        let r = reflectance(2.0, 4.0, Some(0.5));
        assert!((r as f64 - PI).abs() < 1e-6);
    }

    #[test]
    fn test_reflectance_nan_propagation() {
        assert!(reflectance(f32::NAN, 1.0, None).is_nan());
        assert!(reflectance(f32::INFINITY, 1.0, None).is_nan());
        assert!(reflectance(1e-40, 1.0, None).is_nan());
        assert!(reflectance(1.0, f64::NAN, None).is_nan());
        assert!(reflectance(1.0, 1e-15, None).is_nan());
        assert!(reflectance(1.0, -5.0, None).is_nan());
        assert!(reflectance(1.0, 1.0, Some(0.0)).is_nan());
        assert!(reflectance(1.0, 1.0, Some(-0.2)).is_nan());
        assert_eq!(reflectance(0.0, 1.0, None), 0.0);
    }
}
