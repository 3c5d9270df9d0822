//! Per-file processing session.
//!
//! A [`ProcessingSession`] owns the cluster resolver and the correction
//! pipeline for one product. States are decoded in start-time order,
//! calibrated, and handed to a [`RecordSink`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cluster_config::{CacheStats, ClusterResolver, ConfigSource};
use l0_parser::{
    decode_state_with_timing, group_states, pds, read_packets, Product, StatePackets,
    StateTimingTable,
};
use rayon::prelude::*;
use scia_common::{CalibrationFlags, ClusterRecord, Mjd, SourceKind};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{GeometryConfig, ProcessorConfig};
use crate::context::{CorrectionContext, PhaseTracker, StateParams};
use crate::error::{CalibrationError, Result};
use crate::pipeline::{CalibrationPipeline, ProcessingWarning};
use crate::solar_store::SolarSpectrumStore;
use crate::source::CalibrationSource;

/// Orbit position and illumination of a state.
pub trait StateGeometry {
    /// Fractional position within the orbit, in `[0, 1)`.
    fn orbit_phase(&self, time: &Mjd) -> f32;
    fn solar_zenith_deg(&self, state_id: u8, time: &Mjd) -> f32;
}

/// Orbit phase from a fixed period and one ascending node crossing.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPeriodGeometry {
    pub ascending_node: Mjd,
    pub orbital_period_s: f64,
    pub solar_zenith_deg: f32,
}

impl FixedPeriodGeometry {
    pub fn new(ascending_node: Mjd, orbital_period_s: f64, solar_zenith_deg: f32) -> Self {
        Self {
            ascending_node,
            orbital_period_s,
            solar_zenith_deg,
        }
    }

    /// Geometry from configuration; `first_state` anchors the orbit when no
    /// ascending node is configured.
    pub fn from_config(config: &GeometryConfig, first_state: Mjd) -> Self {
        Self::new(
            config.ascending_node.unwrap_or(first_state),
            config.orbital_period_s,
            config.solar_zenith_deg,
        )
    }
}

impl StateGeometry for FixedPeriodGeometry {
    fn orbit_phase(&self, time: &Mjd) -> f32 {
        let elapsed = time.as_seconds() - self.ascending_node.as_seconds();
        let phase = (elapsed / self.orbital_period_s).rem_euclid(1.0);
        // rem_euclid may round up to exactly 1.0 for tiny negative inputs
        if phase >= 1.0 {
            0.0
        } else {
            phase as f32
        }
    }

    fn solar_zenith_deg(&self, _state_id: u8, _time: &Mjd) -> f32 {
        self.solar_zenith_deg
    }
}

/// Consumer of calibrated states.
pub trait RecordSink {
    fn accept(&mut self, params: &StateParams, records: &[ClusterRecord]) -> Result<()>;

    /// Called once after the last state of a file.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every state in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub states: Vec<(StateParams, Vec<ClusterRecord>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &ClusterRecord> {
        self.states.iter().flat_map(|(_, records)| records.iter())
    }
}

impl RecordSink for MemorySink {
    fn accept(&mut self, params: &StateParams, records: &[ClusterRecord]) -> Result<()> {
        self.states.push((params.clone(), records.to_vec()));
        Ok(())
    }
}

#[derive(Serialize)]
struct RecordLine<'a> {
    state_id: u8,
    orbit: u16,
    orbit_phase: f32,
    source_kind: SourceKind,
    solar_zenith_deg: f32,
    utc: String,
    #[serde(flatten)]
    record: &'a ClusterRecord,
}

/// Writes one JSON object per cluster record.
///
/// Non-finite pixel values are written as `null`.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn accept(&mut self, params: &StateParams, records: &[ClusterRecord]) -> Result<()> {
        let utc = params.timestamp.to_string();
        for record in records {
            let line = RecordLine {
                state_id: params.state_id,
                orbit: params.orbit,
                orbit_phase: params.orbit_phase,
                source_kind: params.source_kind,
                solar_zenith_deg: params.solar_zenith_deg,
                utc: utc.clone(),
                record,
            };
            serde_json::to_writer(&mut self.writer, &line)
                .map_err(|e| CalibrationError::Sink(e.to_string()))?;
            self.writer
                .write_all(b"\n")
                .map_err(|e| CalibrationError::Sink(e.to_string()))?;
            self.lines += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| CalibrationError::Sink(e.to_string()))
    }
}

/// Outcome of processing one product.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileReport {
    pub product: String,
    pub orbit: u16,
    pub states_processed: usize,
    pub states_skipped: usize,
    pub records_written: usize,
    pub warnings: Vec<ProcessingWarning>,
    pub memo_hits: u64,
    pub memo_misses: u64,
}

impl FileReport {
    fn skip(&mut self, state_id: u8, reason: String) {
        warn!(state_id, reason = %reason, "Skipping state");
        self.states_skipped += 1;
        self.warnings.push(ProcessingWarning::StateSkipped { state_id, reason });
    }
}

/// Phase boundaries of the variable dark table, wrapped to `[0, 1]`.
fn phase_boundaries(source: &dyn CalibrationSource) -> Result<Vec<f64>> {
    let mut boundaries = vec![0.0, 1.0];
    match source.leakage_variable() {
        Ok(records) => boundaries.extend(records.iter().map(|r| r.orbit_phase as f64)),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => warn!(error = %e, "Variable dark table unreadable, phase tracking by orbit only"),
    }
    boundaries.retain(|b| b.is_finite());
    boundaries.sort_by(|a, b| a.total_cmp(b));
    boundaries.dedup();
    Ok(boundaries)
}

/// Decoder, resolver and correction chain for a sequence of products.
pub struct ProcessingSession<S> {
    resolver: ClusterResolver<S>,
    pipeline: CalibrationPipeline,
    flags: CalibrationFlags,
    geometry: GeometryConfig,
    timing: StateTimingTable,
}

impl<S: ConfigSource> ProcessingSession<S> {
    pub fn new(
        source: S,
        config: &ProcessorConfig,
        solar_store: Option<Arc<dyn SolarSpectrumStore>>,
    ) -> Self {
        Self {
            resolver: ClusterResolver::with_config(source, &config.resolver),
            pipeline: CalibrationPipeline::from_config(&config.calibration, solar_store),
            flags: config.calibration.flags,
            geometry: config.geometry.clone(),
            timing: config.state_timing,
        }
    }

    /// Session with an explicit resolver and pipeline.
    pub fn with_pipeline(
        resolver: ClusterResolver<S>,
        pipeline: CalibrationPipeline,
        flags: CalibrationFlags,
    ) -> Self {
        Self {
            resolver,
            pipeline,
            flags,
            geometry: GeometryConfig::default(),
            timing: StateTimingTable::default(),
        }
    }

    /// Replace the per-state timing offsets used for cluster timestamps.
    pub fn with_timing(mut self, timing: StateTimingTable) -> Self {
        self.timing = timing;
        self
    }

    pub fn resolver(&self) -> &ClusterResolver<S> {
        &self.resolver
    }

    pub fn resolver_stats(&self) -> CacheStats {
        self.resolver.stats()
    }

    fn read_states(product: &Product) -> Result<Vec<StatePackets>> {
        let mds = product.dataset(pds::SOURCE_PACKETS)?;
        let packets = read_packets(&mds.data)?;
        Ok(group_states(packets))
    }

    /// Process a product using the configured fixed-period geometry.
    pub fn process_product(
        &mut self,
        product: &Product,
        sink: &mut dyn RecordSink,
        cancel: &AtomicBool,
    ) -> Result<FileReport> {
        let states = Self::read_states(product)?;
        let first = states.first().map(|s| s.start_time).unwrap_or_default();
        let geometry = FixedPeriodGeometry::from_config(&self.geometry, first);
        self.run_states(product, product, states, &geometry, sink, cancel)
    }

    /// Process a product with caller-supplied geometry.
    pub fn process_product_with_geometry(
        &mut self,
        product: &Product,
        geometry: &dyn StateGeometry,
        sink: &mut dyn RecordSink,
        cancel: &AtomicBool,
    ) -> Result<FileReport> {
        let states = Self::read_states(product)?;
        self.run_states(product, product, states, geometry, sink, cancel)
    }

    /// Process a product whose calibration data sets come from `calibration`.
    pub fn process_with_calibration(
        &mut self,
        product: &Product,
        calibration: &dyn CalibrationSource,
        geometry: &dyn StateGeometry,
        sink: &mut dyn RecordSink,
        cancel: &AtomicBool,
    ) -> Result<FileReport> {
        let states = Self::read_states(product)?;
        self.run_states(product, calibration, states, geometry, sink, cancel)
    }

    fn run_states(
        &mut self,
        product: &Product,
        calibration: &dyn CalibrationSource,
        states: Vec<StatePackets>,
        geometry: &dyn StateGeometry,
        sink: &mut dyn RecordSink,
        cancel: &AtomicBool,
    ) -> Result<FileReport> {
        let orbit = product.absolute_orbit();
        let mut report = FileReport {
            product: product.product_name().to_string(),
            orbit,
            ..Default::default()
        };

        let pixel_wavelength: Arc<[f32]> = match calibration.pixel_wavelength() {
            Ok(Some(wavelength)) => wavelength,
            Ok(None) => Arc::from(Vec::new()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Wavelength grid unreadable");
                Arc::from(Vec::new())
            }
        };

        let mut tracker = PhaseTracker::new(phase_boundaries(calibration)?);
        let mut file_scope_dirty = true;
        let stats_before = self.resolver.stats();

        for state in &states {
            if cancel.load(Ordering::Relaxed) {
                info!(product = %report.product, "Processing cancelled");
                return Err(CalibrationError::Cancelled);
            }

            let state_id = state.state_id;
            if state.corrupt_packets > 0 {
                report.warnings.push(ProcessingWarning::Decode {
                    state_id,
                    message: format!("{} corrupt packets dropped", state.corrupt_packets),
                });
            }
            if state.packets.is_empty() {
                report.skip(state_id, "no decodable packets".to_string());
                continue;
            }

            let resolution = match self.resolver.resolve_table(state_id, orbit) {
                Ok(resolution) => resolution,
                Err(e) => {
                    report.skip(state_id, e.to_string());
                    continue;
                }
            };
            if resolution.source.is_fallback() {
                report
                    .warnings
                    .push(ProcessingWarning::config_fallback(state_id, orbit, resolution.source));
            }

            let decoded = match decode_state_with_timing(
                &state.packets,
                &resolution.table.clusters,
                &self.timing,
            ) {
                Ok(decoded) => decoded,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    report.skip(state_id, e.to_string());
                    continue;
                }
            };
            report.warnings.extend(
                decoded
                    .warnings
                    .iter()
                    .map(|w| ProcessingWarning::decode(state_id, w)),
            );
            let mut records = decoded.records;

            let timestamp = state.start_time;
            let orbit_phase = geometry.orbit_phase(&timestamp);
            let orbit_phase_scope_dirty = tracker.update(orbit_phase);
            let source_kind = SourceKind::from_state_id(state_id);

            let ctx = CorrectionContext {
                flags: self.flags,
                file_scope_dirty,
                orbit_phase_scope_dirty,
                orbit_phase,
                source_kind,
                source: calibration,
            };
            let params = StateParams {
                state_id,
                orbit,
                orbit_phase,
                source_kind,
                timestamp,
                solar_zenith_deg: geometry.solar_zenith_deg(state_id, &timestamp),
                pixel_wavelength: Arc::clone(&pixel_wavelength),
            };

            let module_warnings = self.pipeline.run(&ctx, &params, &mut records)?;
            report.warnings.extend(module_warnings);
            file_scope_dirty = false;

            sink.accept(&params, &records)?;
            report.records_written += records.len();
            report.states_processed += 1;
            debug!(
                state_id,
                records = records.len(),
                orbit_phase,
                "Processed state"
            );
        }

        let stats = self.resolver.stats();
        report.memo_hits = stats.hits - stats_before.hits;
        report.memo_misses = stats.misses - stats_before.misses;

        info!(
            product = %report.product,
            orbit,
            states_processed = report.states_processed,
            states_skipped = report.states_skipped,
            records = report.records_written,
            warnings = report.warnings.len(),
            "Processed product"
        );
        Ok(report)
    }
}

/// Process several products concurrently, one session per product.
///
/// `make_sink` opens the sink for a product path. Results keep the input
/// order.
pub fn process_products_parallel<S, F>(
    paths: &[PathBuf],
    source: S,
    config: &ProcessorConfig,
    solar_store: Option<Arc<dyn SolarSpectrumStore>>,
    make_sink: F,
    cancel: &AtomicBool,
) -> Vec<(PathBuf, Result<FileReport>)>
where
    S: ConfigSource + Clone + Send + Sync,
    F: Fn(&Path) -> Result<Box<dyn RecordSink + Send>> + Sync,
{
    paths
        .par_iter()
        .map(|path| {
            let result = process_one(
                path,
                source.clone(),
                config,
                solar_store.clone(),
                &make_sink,
                cancel,
            );
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "Product failed");
            }
            (path.clone(), result)
        })
        .collect()
}

fn process_one<S, F>(
    path: &Path,
    source: S,
    config: &ProcessorConfig,
    solar_store: Option<Arc<dyn SolarSpectrumStore>>,
    make_sink: &F,
    cancel: &AtomicBool,
) -> Result<FileReport>
where
    S: ConfigSource,
    F: Fn(&Path) -> Result<Box<dyn RecordSink + Send>>,
{
    let product = Product::open(path)?;
    let mut session = ProcessingSession::new(source, config, solar_store);
    let mut sink = make_sink(path)?;
    let report = session.process_product(&product, sink.as_mut(), cancel)?;
    sink.finish()?;
    Ok(report)
}
