//! Cluster configuration resolution.
//!
//! [`ClusterResolver`] turns a `(state_id, orbit)` into the channel-relative
//! [`ClusterTable`] used by the packet decoder. It owns a small LRU memo of
//! recent keys and a per-state history used as fallback for unresolved rows.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use scia_common::{ClusterDef, ClusterTable, CHANNEL_SIZE, NUM_CHANNELS};
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{ConfigError, Result};
use crate::store::{ConfigSource, RowLookup, StoredCluster, StoredTable};

/// How a resolution was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    /// The store row in effect for the orbit.
    Store,
    /// The last table resolved for the state in this session.
    SessionHistory,
    /// The nearest earlier resolved row of the store, valid from `orbit`.
    EarlierRow { orbit: u16 },
}

impl ResolveSource {
    /// Whether the table comes from a fallback rather than its own row.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Store)
    }
}

/// A resolved cluster table.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub table: Arc<ClusterTable>,
    pub source: ResolveSource,
}

/// Memo statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate the memo hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Convert one stored cluster to the ascending channel-relative convention.
fn convert_cluster(stored: &StoredCluster) -> Result<ClusterDef> {
    let channel = stored.channel;
    if channel == 0 || channel as usize > NUM_CHANNELS {
        return Err(ConfigError::invalid_store(format!(
            "cluster {} has invalid channel {}",
            stored.cluster_id, channel
        )));
    }

    let start = stored.start as i64;
    let length = stored.length as i64;
    let relative = if channel == 2 {
        2 * CHANNEL_SIZE as i64 - start - length
    } else {
        start - (channel as i64 - 1) * CHANNEL_SIZE as i64
    };
    let start_pixel = u16::try_from(relative)
        .ok()
        .filter(|&s| (s as usize) < CHANNEL_SIZE)
        .ok_or_else(|| {
            ConfigError::invalid_store(format!(
                "cluster {} start {} is outside channel {}",
                stored.cluster_id, stored.start, channel
            ))
        })?;

    Ok(ClusterDef {
        channel_id: channel,
        cluster_id: stored.cluster_id,
        start_pixel,
        length: stored.length,
        integration_time: stored.integration_time,
        coadd_factor: stored.coadd_factor,
        readout_count: stored.readouts,
    })
}

/// Convert and validate a stored table.
pub fn convert_table(stored: &StoredTable) -> Result<ClusterTable> {
    let clusters = stored
        .clusters
        .iter()
        .map(convert_cluster)
        .collect::<Result<Vec<_>>>()?;

    // Channel 2 boundaries are stored in readout order. An unsplit channel
    // (stored 0) maps to the channel end.
    let [boundary_1, boundary_2] = stored.virtual_boundary;
    let boundary_2 = (CHANNEL_SIZE as u16).saturating_sub(boundary_2);

    let table = ClusterTable::new(clusters, [boundary_1, boundary_2]);
    table.validate().map_err(ConfigError::InvalidStore)?;
    Ok(table)
}

fn row_to_table(row: RowLookup<'_>) -> Result<Option<ClusterTable>> {
    match row {
        RowLookup::Empty => Ok(Some(ClusterTable::default())),
        RowLookup::Table(stored) => convert_table(stored).map(Some),
        RowLookup::BeforeFirst | RowLookup::Unresolved => Ok(None),
    }
}

/// Resolves cluster configurations for one processing session.
pub struct ClusterResolver<S> {
    source: S,
    memo: LruCache<(u8, u16), Resolution>,
    history: HashMap<u8, Arc<ClusterTable>>,
    allow_fallback: bool,
    hits: u64,
    misses: u64,
}

impl<S: ConfigSource> ClusterResolver<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, &ResolverConfig::default())
    }

    pub fn with_config(source: S, config: &ResolverConfig) -> Self {
        let capacity = NonZeroUsize::new(config.memo_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            memo: LruCache::new(capacity),
            history: HashMap::new(),
            allow_fallback: config.allow_fallback,
            hits: 0,
            misses: 0,
        }
    }

    /// Cluster definitions for a state in a given orbit.
    pub fn resolve(&mut self, state_id: u8, orbit: u16) -> Result<Vec<ClusterDef>> {
        Ok(self.resolve_table(state_id, orbit)?.table.clusters.clone())
    }

    /// Full cluster table for a state in a given orbit.
    ///
    /// A repeat of a memoized key does not touch the store.
    pub fn resolve_table(&mut self, state_id: u8, orbit: u16) -> Result<Resolution> {
        let key = (state_id, orbit);
        if let Some(resolution) = self.memo.get(&key) {
            self.hits += 1;
            return Ok(resolution.clone());
        }
        self.misses += 1;

        let resolution = self.lookup(state_id, orbit)?;
        self.history.insert(state_id, Arc::clone(&resolution.table));
        self.memo.put(key, resolution.clone());
        Ok(resolution)
    }

    fn lookup(&self, state_id: u8, orbit: u16) -> Result<Resolution> {
        let group = self.source.state_group(state_id);
        let row = group.map(|g| g.row(orbit)).unwrap_or(RowLookup::BeforeFirst);

        if let Some(table) = row_to_table(row)? {
            debug!(
                state_id,
                orbit,
                clusters = table.clusters.len(),
                "Resolved cluster table"
            );
            return Ok(Resolution {
                table: Arc::new(table),
                source: ResolveSource::Store,
            });
        }

        if !self.allow_fallback {
            return Err(ConfigError::Unresolved { state_id, orbit });
        }

        if let Some(table) = self.history.get(&state_id) {
            warn!(
                state_id,
                orbit,
                fallback = "session_history",
                "Cluster configuration unresolved, reusing last table of this state"
            );
            return Ok(Resolution {
                table: Arc::clone(table),
                source: ResolveSource::SessionHistory,
            });
        }

        if let Some((valid_from, earlier)) = group.and_then(|g| g.nearest_resolved_before(orbit)) {
            if let Some(table) = row_to_table(earlier)? {
                warn!(
                    state_id,
                    orbit,
                    fallback_orbit = valid_from,
                    "Cluster configuration unresolved, using nearest earlier row"
                );
                return Ok(Resolution {
                    table: Arc::new(table),
                    source: ResolveSource::EarlierRow { orbit: valid_from },
                });
            }
        }

        Err(ConfigError::Unresolved { state_id, orbit })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.memo.len(),
        }
    }

    /// Forget memoized keys and session history.
    pub fn clear(&mut self) {
        self.memo.clear();
        self.history.clear();
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
