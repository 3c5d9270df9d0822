//! Cluster configuration store and resolver.
//!
//! The store describes, per instrument state, which detector clusters are
//! read out from which orbit on. [`ClusterResolver`] answers
//! `(state_id, orbit)` queries against it with memoization and a fallback
//! to the last known configuration for unresolved rows.

pub mod config;
pub mod error;
pub mod resolver;
pub mod store;

pub use config::ResolverConfig;
pub use error::{ConfigError, Result};
pub use resolver::{convert_table, CacheStats, ClusterResolver, ResolveSource, Resolution};
pub use store::{
    ConfigSource, ConfigStore, RowLookup, StateGroup, StoredCluster, StoredTable, ROW_EMPTY,
    ROW_UNRESOLVED,
};
