//! Error types for cluster configuration lookup.

use thiserror::Error;

/// Errors that can occur while loading a store or resolving a state.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The store file could not be read.
    #[error("failed to read cluster store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The store file is not valid YAML or JSON.
    #[error("failed to parse cluster store: {0}")]
    Parse(String),

    /// The store content breaks a structural rule.
    #[error("invalid cluster store: {0}")]
    InvalidStore(String),

    /// No configuration exists for the state and no fallback is available.
    #[error("no cluster configuration for state {state_id} at orbit {orbit}")]
    Unresolved { state_id: u8, orbit: u16 },
}

impl ConfigError {
    /// Create an InvalidStore error.
    pub fn invalid_store(msg: impl Into<String>) -> Self {
        Self::InvalidStore(msg.into())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Result type alias using ConfigError.
pub type Result<T> = std::result::Result<T, ConfigError>;
