//! Error types for level-0 parsing.

use thiserror::Error;

/// Errors raised while reading a level-0 product.
#[derive(Error, Debug)]
pub enum L0Error {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read ran past the end of its byte window.
    #[error("truncated {context} at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A named data set is absent from the product directory.
    #[error("data set not found: {0}")]
    NotFound(String),

    /// Structurally invalid data.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A pixel buffer could not be allocated.
    #[error("failed to allocate {0} pixel values")]
    Alloc(usize),
}

impl L0Error {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Errors that make the rest of the file unreadable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Truncated { .. } | Self::Alloc(_))
    }
}

/// Result type for level-0 operations.
pub type Result<T> = std::result::Result<T, L0Error>;
