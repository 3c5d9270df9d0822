//! Calibration of decoded SCIAMACHY cluster records.
//!
//! A [`ProcessingSession`] decodes the states of a level-0 product, resolves
//! their cluster configuration and runs the [`CalibrationPipeline`] of
//! correction modules over each state before passing the records to a
//! [`RecordSink`].
//!
//! # Example
//!
//! ```ignore
//! use calibration::{JsonLinesSink, ProcessingSession, ProcessorConfig};
//!
//! let mut session = ProcessingSession::new(store, &config, None);
//! let mut sink = JsonLinesSink::new(std::io::stdout());
//! let report = session.process_product(&product, &mut sink, &cancel)?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod interpolation;
pub mod modules;
pub mod pipeline;
pub mod processor;
pub mod solar_store;
pub mod source;

pub use config::{CalibrationConfig, GeometryConfig, ProcessorConfig};
pub use context::{CorrectionContext, PhaseTracker, StateParams};
pub use error::{CalibrationError, Result};
pub use interpolation::{AkimaCoeffs, EvalPath, InterpolationError, PhaseTable};
pub use modules::{CorrectionModule, DarkCurrentModule, ReflectanceModule};
pub use pipeline::{CalibrationPipeline, ProcessingWarning};
pub use processor::{
    process_products_parallel, FileReport, FixedPeriodGeometry, JsonLinesSink, MemorySink,
    ProcessingSession, RecordSink, StateGeometry,
};
pub use solar_store::{InMemorySolarStore, SolarSpectrumStore, StoredSpectrum};
pub use source::{CalibrationSource, StaticCalibration};
