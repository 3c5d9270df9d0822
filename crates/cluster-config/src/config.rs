//! Resolver configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::ClusterResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Number of `(state, orbit)` keys memoized.
    pub memo_capacity: usize,

    /// Fall back to the last resolved table for unresolved rows.
    pub allow_fallback: bool,

    /// Path of the cluster store file (YAML or JSON).
    pub store_path: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            memo_capacity: 1,
            allow_fallback: true,
            store_path: None,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCIA_RESOLVER_MEMO_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                config.memo_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("SCIA_RESOLVER_FALLBACK") {
            config.allow_fallback = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("SCIA_CLUSTER_STORE") {
            config.store_path = Some(PathBuf::from(val));
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.memo_capacity == 0 {
            return Err("memo_capacity must be > 0".to_string());
        }
        Ok(())
    }
}
