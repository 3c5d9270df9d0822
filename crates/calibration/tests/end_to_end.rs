//! Decoding and calibrating synthetic products through a processing session.

use std::f64::consts::PI;
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use calibration::interpolation::{evaluate_using, fit, EvalPath};
use calibration::{
    process_products_parallel, CalibrationError, CalibrationPipeline, CorrectionContext,
    DarkCurrentModule, FixedPeriodGeometry, JsonLinesSink, MemorySink, ProcessingSession,
    ProcessingWarning, ProcessorConfig, RecordSink, StateParams, StaticCalibration,
};
use cluster_config::ConfigStore;
use l0_parser::{LeakageConstant, Product, StateTimingTable};
use scia_common::{
    CalibrationFlags, ClusterRecord, Corrections, Mjd, SourceKind, SCIENCE_PIXELS,
    VARIABLE_DARK_PIXELS,
};
use test_utils::fixtures::{orbits, store};
use test_utils::{
    assert_approx_eq, solar_irradiance, temp_test_dir, wavelength_grid, DetectorPacketBuilder,
    ProductBuilder,
};

fn two_cluster_packet() -> Vec<u8> {
    DetectorPacketBuilder::new(1, 1)
        .on_board_time(10)
        .cluster(0, 1, 0, &[100, 200, 300, 400])
        .cluster(1, 2, 4, &[70_000, 80_000, 90_000, 100_000])
        .build()
}

fn dark_product(orbit: u16, packets: Vec<Vec<u8>>) -> ProductBuilder {
    ProductBuilder::new(orbit)
        .packets(packets)
        .leakage_constant(&vec![0.0; SCIENCE_PIXELS], &vec![1.0; SCIENCE_PIXELS])
}

fn open(builder: ProductBuilder) -> Product {
    Product::from_bytes(Bytes::from(builder.build())).unwrap()
}

fn fixture_store() -> ConfigStore {
    ConfigStore::from_yaml_str(store::CLUSTER_STORE_YAML).unwrap()
}

fn config(flags: CalibrationFlags) -> ProcessorConfig {
    let mut config = ProcessorConfig::default();
    config.calibration.flags = flags;
    config
}

fn run(session: &mut ProcessingSession<ConfigStore>, product: &Product) -> (MemorySink, calibration::FileReport) {
    let mut sink = MemorySink::new();
    let cancel = AtomicBool::new(false);
    let report = session.process_product(product, &mut sink, &cancel).unwrap();
    (sink, report)
}

#[test]
fn test_two_cluster_dark_subtracts_half() {
    let product = open(dark_product(orbits::EARLY, vec![two_cluster_packet()]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (sink, report) = run(&mut session, &product);

    assert_eq!(report.orbit, orbits::EARLY);
    assert_eq!(report.states_processed, 1);
    assert_eq!(report.states_skipped, 0);
    assert_eq!(report.records_written, 3);

    let records: Vec<&ClusterRecord> = sink.records().collect();
    assert_eq!(records[0].pixel_values, vec![99.5, 199.5, 299.5, 399.5]);
    assert_eq!(
        records[1].pixel_values,
        vec![69_999.5, 79_999.5, 89_999.5, 99_999.5]
    );
    assert!(records[0].applied.contains(Corrections::DARK));

    // the channel 2 cluster of the table has no packets
    assert_eq!(records[2].channel_id, 2);
    assert_eq!(records[2].pixel_values, vec![-0.5; 16]);
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, ProcessingWarning::Decode { state_id: 1, .. })));
}

#[test]
fn test_truncated_leakage_data_set_aborts_file() {
    let mut bytes = dark_product(orbits::EARLY, vec![two_cluster_packet()]).build();
    bytes.truncate(bytes.len() - 100);
    let product = Product::from_bytes(Bytes::from(bytes)).unwrap();

    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let mut sink = MemorySink::new();
    let cancel = AtomicBool::new(false);
    let err = session
        .process_product(&product, &mut sink, &cancel)
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, CalibrationError::Decode(_)));
    assert!(sink.states.is_empty());
}

#[test]
fn test_configured_timing_table_shifts_timestamps() {
    let product = open(dark_product(orbits::EARLY, vec![two_cluster_packet()]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (sink, _) = run(&mut session, &product);
    let builtin = sink.states[0].1[0].timestamp;

    let mut ticks: Vec<u16> = StateTimingTable::default().into();
    ticks[1] += 256;
    let mut shifted = config(CalibrationFlags::DARK);
    shifted.state_timing = StateTimingTable::from_ticks(&ticks).unwrap();
    let mut session = ProcessingSession::new(fixture_store(), &shifted, None);
    let (sink, _) = run(&mut session, &product);

    let delta = sink.states[0].1[0].timestamp.as_seconds() - builtin.as_seconds();
    assert_approx_eq!(delta, 1.0, 1e-6);
}

#[test]
fn test_dark_correction_is_idempotent() {
    let product = open(dark_product(orbits::EARLY, vec![two_cluster_packet()]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (sink, _) = run(&mut session, &product);
    let (params, mut records) = sink.states[0].clone();
    let expected = records.clone();

    let source = StaticCalibration {
        leakage_constant: Some(LeakageConstant {
            analog_offset: vec![0.0; SCIENCE_PIXELS],
            analog_offset_error: vec![0.0; SCIENCE_PIXELS],
            dark_current: vec![1.0; SCIENCE_PIXELS],
            dark_current_error: vec![0.0; SCIENCE_PIXELS],
            mean_noise: vec![0.0; SCIENCE_PIXELS],
        }),
        ..Default::default()
    };
    let ctx = CorrectionContext {
        flags: CalibrationFlags::DARK,
        file_scope_dirty: true,
        orbit_phase_scope_dirty: true,
        orbit_phase: params.orbit_phase,
        source_kind: params.source_kind,
        source: &source,
    };
    let mut pipeline = CalibrationPipeline::new().with_module(Box::new(DarkCurrentModule::default()));
    assert!(pipeline.run(&ctx, &params, &mut records).unwrap().is_empty());
    assert_eq!(records, expected);
}

const PHASE_STORE_YAML: &str = r#"
states:
  - state_id: 2
    orbit_list: [0]
    orbit_index: [1]
    tables:
      - clusters:
          - { channel: 6, cluster_id: 0, start: 5120, length: 4, integration_time: 1.0, readouts: 1 }
"#;

#[test]
fn test_variable_dark_blends_at_half_phase() {
    let packet = DetectorPacketBuilder::new(2, 6)
        .cluster(0, 1, 0, &[50, 60, 70, 80])
        .build();
    let product = open(dark_product(orbits::EARLY, vec![packet]).leakage_variable(&[
        (0.25, vec![1.0; VARIABLE_DARK_PIXELS]),
        (0.75, vec![3.0; VARIABLE_DARK_PIXELS]),
    ]));
    let store = ConfigStore::from_yaml_str(PHASE_STORE_YAML).unwrap();
    let mut session = ProcessingSession::new(store, &config(CalibrationFlags::DARK), None);

    // packets are stamped at 3600 s of the day; half a 100 s orbit later
    let geometry = FixedPeriodGeometry::new(Mjd::new(1460, 3550, 0), 100.0, 45.0);
    let mut sink = MemorySink::new();
    let cancel = AtomicBool::new(false);
    session
        .process_product_with_geometry(&product, &geometry, &mut sink, &cancel)
        .unwrap();

    let (params, records) = &sink.states[0];
    assert_approx_eq!(params.orbit_phase, 0.5, 1e-6);
    // constant 1.0 plus the blended variable term 2.0
    let expected = [47.0, 57.0, 67.0, 77.0];
    for (value, want) in records[0].pixel_values.iter().zip(expected) {
        assert_approx_eq!(*value, want, 1e-4);
    }
}

#[test]
fn test_limb_state_uses_scan_tail_dark() {
    // 24 readouts of 0.125 s; the 1.5 s window covers the last 12
    let packets: Vec<Vec<u8>> = (0..24u32)
        .map(|k| {
            DetectorPacketBuilder::new(28, 6)
                .on_board_time(7)
                .bcps(k as u16)
                .cluster(0, 1, 0, &vec![100 + k; 32])
                .build()
        })
        .collect();
    let product = open(dark_product(orbits::EARLY, packets));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (sink, report) = run(&mut session, &product);

    assert_eq!(report.states_processed, 1);
    let (params, records) = &sink.states[0];
    assert_eq!(params.source_kind, SourceKind::Limb);
    let record = &records[0];
    assert_eq!(record.num_observations, 24);
    assert_approx_eq!(record.observation(0).unwrap()[0], -17.5, 1e-4);
    assert_approx_eq!(record.observation(23).unwrap()[31], 5.5, 1e-4);
}

fn reflectance_product() -> Product {
    let wavelength = wavelength_grid();
    open(
        dark_product(orbits::EARLY, vec![two_cluster_packet()])
            .sun_reference(&wavelength, &solar_irradiance(&wavelength), 0.25)
            .spectral_calibration(&wavelength),
    )
}

#[test]
fn test_nadir_reflectance() {
    let product = reflectance_product();
    let flags = CalibrationFlags::DARK | CalibrationFlags::REFLECTANCE;
    let mut session = ProcessingSession::new(fixture_store(), &config(flags), None);
    let (sink, report) = run(&mut session, &product);
    assert!(!report
        .warnings
        .iter()
        .any(|w| matches!(w, ProcessingWarning::ModuleFailed { .. })));

    let irradiance = solar_irradiance(&wavelength_grid());
    let cos_sza = 45f64.to_radians().cos();
    let record = sink.records().next().unwrap();
    assert!(record.applied.contains(Corrections::DARK | Corrections::REFLECTANCE));
    for (i, &value) in record.pixel_values.iter().enumerate() {
        let signal = 100.0 * (i + 1) as f64 - 0.5;
        let expected = PI * signal / (cos_sza * irradiance[i] as f64);
        assert_approx_eq!(value as f64 / expected, 1.0, 1e-5);
    }
}

#[test]
fn test_reflectance_below_horizon_is_nan() {
    let product = reflectance_product();
    let flags = CalibrationFlags::DARK | CalibrationFlags::REFLECTANCE;
    let mut session = ProcessingSession::new(fixture_store(), &config(flags), None);
    let geometry = FixedPeriodGeometry::new(Mjd::new(1460, 0, 0), 6035.928, 95.0);
    let mut sink = MemorySink::new();
    let cancel = AtomicBool::new(false);
    session
        .process_product_with_geometry(&product, &geometry, &mut sink, &cancel)
        .unwrap();

    for record in sink.records() {
        assert!(record.pixel_values.iter().all(|v| v.is_nan()));
    }
}

#[test]
fn test_missing_reference_leaves_dark_corrected_values() {
    let product = open(
        dark_product(orbits::EARLY, vec![two_cluster_packet()]).spectral_calibration(&wavelength_grid()),
    );
    let flags = CalibrationFlags::DARK | CalibrationFlags::REFLECTANCE;
    let mut session = ProcessingSession::new(fixture_store(), &config(flags), None);
    let (sink, report) = run(&mut session, &product);

    assert!(report.warnings.iter().any(|w| matches!(
        w,
        ProcessingWarning::ModuleFailed { module: "reflectance", .. }
    )));
    let record = sink.records().next().unwrap();
    assert_eq!(record.pixel_values, vec![99.5, 199.5, 299.5, 399.5]);
    assert!(!record.applied.contains(Corrections::REFLECTANCE));
}

#[test]
fn test_akima_paths_agree_on_reference_grid() {
    let wavelength = wavelength_grid();
    let irradiance = solar_irradiance(&wavelength);
    let x: Vec<f64> = wavelength[..1024].iter().map(|&w| w as f64).collect();
    let y: Vec<f64> = irradiance[..1024].iter().map(|&v| v as f64).collect();
    let coeffs = fit(&x, &y).unwrap();

    let ascending: Vec<f64> = (0..3000).map(|i| x[0] + i as f64 * (x[1023] - x[0]) / 2999.0).collect();
    let descending: Vec<f64> = ascending.iter().rev().copied().collect();

    for points in [&ascending, &descending] {
        let reference = evaluate_using(&coeffs, points, EvalPath::BinarySearch);
        for path in [EvalPath::Forward, EvalPath::Backward, EvalPath::Auto] {
            let values = evaluate_using(&coeffs, points, path);
            for (a, b) in values.iter().zip(&reference) {
                assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
            }
        }
    }
}

#[test]
fn test_states_processed_in_time_order() {
    // dark state 8 starts earlier but is stored after the nadir state
    let dark_state = DetectorPacketBuilder::new(8, 1)
        .isp_time(1460, 3000, 0)
        .on_board_time(3)
        .cluster(0, 1, 0, &[1])
        .build();
    let product = open(dark_product(orbits::EARLY, vec![two_cluster_packet(), dark_state]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (sink, report) = run(&mut session, &product);

    assert_eq!(report.states_processed, 2);
    let ids: Vec<u8> = sink.states.iter().map(|(p, _)| p.state_id).collect();
    assert_eq!(ids, vec![8, 1]);
    // state 8 executes no clusters
    assert!(sink.states[0].1.is_empty());
}

#[test]
fn test_unresolved_row_falls_back_to_earlier_row() {
    let product = open(dark_product(orbits::UNRESOLVED, vec![two_cluster_packet()]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (sink, report) = run(&mut session, &product);

    assert_eq!(report.states_processed, 1);
    assert!(report.warnings.contains(&ProcessingWarning::ConfigFallback {
        state_id: 1,
        orbit: orbits::UNRESOLVED,
        fallback: "earlier_row:0".to_string(),
    }));
    assert_eq!(sink.records().count(), 3);
}

#[test]
fn test_unresolved_row_without_fallback_skips_state() {
    let product = open(dark_product(orbits::UNRESOLVED, vec![two_cluster_packet()]));
    let mut config = config(CalibrationFlags::DARK);
    config.resolver.allow_fallback = false;
    let mut session = ProcessingSession::new(fixture_store(), &config, None);
    let (sink, report) = run(&mut session, &product);

    assert_eq!(report.states_processed, 0);
    assert_eq!(report.states_skipped, 1);
    assert!(matches!(
        report.warnings[0],
        ProcessingWarning::StateSkipped { state_id: 1, .. }
    ));
    assert!(sink.states.is_empty());
}

#[test]
fn test_memo_reused_across_products() {
    let product = open(dark_product(orbits::EARLY, vec![two_cluster_packet()]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);
    let (_, first) = run(&mut session, &product);
    let (_, second) = run(&mut session, &product);
    assert_eq!((first.memo_hits, first.memo_misses), (0, 1));
    assert_eq!((second.memo_hits, second.memo_misses), (1, 0));
}

struct CancellingSink<'a> {
    cancel: &'a AtomicBool,
    accepted: usize,
}

impl RecordSink for CancellingSink<'_> {
    fn accept(&mut self, _: &StateParams, _: &[ClusterRecord]) -> calibration::Result<()> {
        self.accepted += 1;
        self.cancel.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_cancel_between_states() {
    let second = DetectorPacketBuilder::new(1, 1)
        .isp_time(1460, 3700, 0)
        .on_board_time(11)
        .cluster(0, 1, 0, &[1, 2, 3, 4])
        .build();
    let product = open(dark_product(orbits::EARLY, vec![two_cluster_packet(), second]));
    let mut session = ProcessingSession::new(fixture_store(), &config(CalibrationFlags::DARK), None);

    let cancel = AtomicBool::new(false);
    let mut sink = CancellingSink {
        cancel: &cancel,
        accepted: 0,
    };
    let err = session.process_product(&product, &mut sink, &cancel).unwrap_err();
    assert!(matches!(err, CalibrationError::Cancelled));
    assert!(err.is_fatal());
    assert_eq!(sink.accepted, 1);
}

#[test]
fn test_parallel_products_write_json_lines() {
    let dir = temp_test_dir();
    let mut paths = Vec::new();
    for name in ["a.N1", "b.N1"] {
        let path = dir.path().join(name);
        dark_product(orbits::EARLY, vec![two_cluster_packet()])
            .write_to(&path)
            .unwrap();
        paths.push(path);
    }
    paths.push(dir.path().join("missing.N1"));

    let store = Arc::new(fixture_store());
    let cancel = AtomicBool::new(false);
    let results = process_products_parallel(
        &paths,
        store,
        &config(CalibrationFlags::DARK),
        None,
        |path| {
            let file = std::fs::File::create(path.with_extension("jsonl"))?;
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))) as Box<dyn RecordSink + Send>)
        },
        &cancel,
    );

    assert_eq!(results.len(), 3);
    for (path, result) in &results[..2] {
        let report = result.as_ref().unwrap();
        assert_eq!(report.records_written, 3);

        let text = std::fs::read_to_string(path.with_extension("jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["state_id"], 1);
        assert_eq!(lines[0]["source_kind"], "nadir");
        assert_eq!(lines[0]["pixel_values"][0], 99.5);
    }
    assert!(results[2].1.is_err());
}
