//! Interpolation used by the correction modules.

pub mod akima;
pub mod phase;

pub use akima::{evaluate, evaluate_using, fit, AkimaCoeffs, EvalPath};
pub use phase::{PhaseBracket, PhaseTable};

use thiserror::Error;

/// Errors raised by the interpolators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// Abscissae decrease (or are NaN) at `index`.
    #[error("abscissae not monotonic at index {index}")]
    NotMonotonic { index: usize },

    #[error("length mismatch: {x} abscissae, {y} ordinates")]
    LengthMismatch { x: usize, y: usize },

    #[error("no input points")]
    EmptyInput,
}
