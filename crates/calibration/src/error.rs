//! Error types for calibration and processing.

use cluster_config::ConfigError;
use l0_parser::L0Error;
use thiserror::Error;

use crate::interpolation::InterpolationError;

/// Errors that can occur while calibrating or processing a product.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Product navigation or decoding failed.
    #[error(transparent)]
    Decode(#[from] L0Error),

    /// Cluster configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("interpolation failed: {0}")]
    Interpolation(#[from] InterpolationError),

    /// A calibration input needed by a module is unavailable.
    #[error("missing calibration data: {0}")]
    MissingData(String),

    /// A configuration or store file could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    /// A module changed record geometry.
    #[error("module {module} broke the record contract: {reason}")]
    ContractViolation { module: &'static str, reason: String },

    /// Processing was cancelled between states.
    #[error("processing cancelled")]
    Cancelled,

    /// Writing to a sink failed.
    #[error("sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalibrationError {
    /// Create a MissingData error.
    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingData(msg.into())
    }

    /// Create a Parse error for a file.
    pub fn parse(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error ends processing of the whole file.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Decode(e) => e.is_fatal(),
            Self::Cancelled | Self::Sink(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

/// Result type alias using CalibrationError.
pub type Result<T> = std::result::Result<T, CalibrationError>;
