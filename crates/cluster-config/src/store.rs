//! On-disk cluster configuration store.
//!
//! The store holds one group per state id. Each group maps orbit ranges to
//! cluster tables through two parallel lists:
//!
//! ```yaml
//! states:
//!   - state_id: 1
//!     orbit_list:  [0, 2000, 4000]   # first orbit each entry is valid
//!     orbit_index: [1, 255, 2]       # 0 empty, 255 unresolved, n = tables[n-1]
//!     tables:
//!       - virtual_boundary: [552, 200]
//!         clusters:
//!           - { channel: 1, cluster_id: 0, start: 0, length: 552,
//!               integration_time: 0.25, coadd_factor: 1, readouts: 4 }
//! ```
//!
//! Cluster starts are absolute science-pixel indexes as stored by the
//! instrument; channel 2 is stored in its mirrored readout direction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use scia_common::NUM_STATE_IDS;

/// Row marker: the state executes no clusters in this orbit range.
pub const ROW_EMPTY: u8 = 0;
/// Row marker: no configuration is known for this orbit range.
pub const ROW_UNRESOLVED: u8 = 0xFF;

/// One cluster as written in the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredCluster {
    pub channel: u8,
    pub cluster_id: u8,
    /// Absolute science-pixel index of the first pixel in readout order.
    pub start: u16,
    pub length: u16,
    pub integration_time: f32,
    #[serde(default = "default_coadd")]
    pub coadd_factor: u16,
    pub readouts: u16,
}

fn default_coadd() -> u16 {
    1
}

/// Cluster table as written in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTable {
    #[serde(default)]
    pub virtual_boundary: [u16; 2],
    pub clusters: Vec<StoredCluster>,
}

/// What the store says about one (state, orbit).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowLookup<'a> {
    /// The orbit precedes the first entry of the group.
    BeforeFirst,
    /// The state is configured with zero clusters.
    Empty,
    Unresolved,
    Table(&'a StoredTable),
}

impl RowLookup<'_> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Empty | Self::Table(_))
    }
}

/// All configuration rows of one state id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateGroup {
    pub state_id: u8,
    pub orbit_list: Vec<u16>,
    pub orbit_index: Vec<u8>,
    #[serde(default)]
    pub tables: Vec<StoredTable>,
}

impl StateGroup {
    /// Index into `orbit_list` of the last entry `<= orbit`.
    pub fn entry_for(&self, orbit: u16) -> Option<usize> {
        let after = self.orbit_list.partition_point(|&first| first <= orbit);
        after.checked_sub(1)
    }

    fn row_at(&self, entry: usize) -> RowLookup<'_> {
        match self.orbit_index.get(entry).copied() {
            None | Some(ROW_UNRESOLVED) => RowLookup::Unresolved,
            Some(ROW_EMPTY) => RowLookup::Empty,
            Some(n) => match self.tables.get(n as usize - 1) {
                Some(table) => RowLookup::Table(table),
                None => RowLookup::Unresolved,
            },
        }
    }

    /// Row in effect for `orbit`.
    pub fn row(&self, orbit: u16) -> RowLookup<'_> {
        match self.entry_for(orbit) {
            Some(entry) => self.row_at(entry),
            None => RowLookup::BeforeFirst,
        }
    }

    /// Nearest resolved row strictly before the row in effect for `orbit`,
    /// with the first orbit it was valid for.
    pub fn nearest_resolved_before(&self, orbit: u16) -> Option<(u16, RowLookup<'_>)> {
        let entry = self.entry_for(orbit)?;
        (0..entry).rev().find_map(|i| {
            let row = self.row_at(i);
            row.is_resolved().then(|| (self.orbit_list[i], row))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_id as usize >= NUM_STATE_IDS {
            return Err(ConfigError::invalid_store(format!(
                "state id {} out of range",
                self.state_id
            )));
        }
        if self.orbit_list.len() != self.orbit_index.len() {
            return Err(ConfigError::invalid_store(format!(
                "state {}: {} orbits but {} row indexes",
                self.state_id,
                self.orbit_list.len(),
                self.orbit_index.len()
            )));
        }
        if self.orbit_list.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::invalid_store(format!(
                "state {}: orbit list is not sorted",
                self.state_id
            )));
        }
        for &index in &self.orbit_index {
            if index != ROW_EMPTY && index != ROW_UNRESOLVED && index as usize > self.tables.len() {
                return Err(ConfigError::invalid_store(format!(
                    "state {}: row index {} but only {} tables",
                    self.state_id,
                    index,
                    self.tables.len()
                )));
            }
        }
        Ok(())
    }
}

/// Lookup of per-state configuration groups.
///
/// Implemented by [`ConfigStore`]; the resolver only needs this seam.
pub trait ConfigSource {
    fn state_group(&self, state_id: u8) -> Option<&StateGroup>;
}

/// The complete configuration store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigStore {
    #[serde(default)]
    pub states: Vec<StateGroup>,
}

impl ConfigStore {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let store: Self = serde_yaml::from_str(text)?;
        store.validate()?;
        Ok(store)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let store: Self = serde_json::from_str(text)?;
        store.validate()?;
        Ok(store)
    }

    /// Load a store file; `.json` files are JSON, everything else YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let store = if is_json {
            Self::from_json_str(&text)?
        } else {
            Self::from_yaml_str(&text)?
        };
        debug!(
            path = %path.display(),
            states = store.states.len(),
            "Loaded cluster store"
        );
        Ok(store)
    }

    pub fn validate(&self) -> Result<()> {
        for (i, group) in self.states.iter().enumerate() {
            group.validate()?;
            if self.states[..i].iter().any(|g| g.state_id == group.state_id) {
                return Err(ConfigError::invalid_store(format!(
                    "state {} appears twice",
                    group.state_id
                )));
            }
        }
        Ok(())
    }
}

impl ConfigSource for ConfigStore {
    fn state_group(&self, state_id: u8) -> Option<&StateGroup> {
        self.states.iter().find(|g| g.state_id == state_id)
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for &T {
    fn state_group(&self, state_id: u8) -> Option<&StateGroup> {
        (**self).state_group(state_id)
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for std::sync::Arc<T> {
    fn state_group(&self, state_id: u8) -> Option<&StateGroup> {
        (**self).state_group(state_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> StateGroup {
        StateGroup {
            state_id: 8,
            orbit_list: vec![100, 200, 300, 400],
            orbit_index: vec![1, ROW_EMPTY, ROW_UNRESOLVED, 2],
            tables: vec![StoredTable::default(), StoredTable::default()],
        }
    }

    #[test]
    fn test_entry_for_uses_last_entry_not_after_orbit() {
        let g = group();
        assert_eq!(g.entry_for(99), None);
        assert_eq!(g.entry_for(100), Some(0));
        assert_eq!(g.entry_for(199), Some(0));
        assert_eq!(g.entry_for(200), Some(1));
        assert_eq!(g.entry_for(u16::MAX), Some(3));
    }

    #[test]
    fn test_row_markers() {
        let g = group();
        assert_eq!(g.row(50), RowLookup::BeforeFirst);
        assert!(matches!(g.row(150), RowLookup::Table(_)));
        assert_eq!(g.row(250), RowLookup::Empty);
        assert_eq!(g.row(350), RowLookup::Unresolved);
        assert!(matches!(g.row(450), RowLookup::Table(_)));
    }

    #[test]
    fn test_nearest_resolved_before() {
        let g = group();
        assert_eq!(g.nearest_resolved_before(350), Some((200, RowLookup::Empty)));
        assert_eq!(g.nearest_resolved_before(150), None);
        assert_eq!(g.nearest_resolved_before(50), None);
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        let mut g = group();
        g.orbit_index[0] = 7;
        assert!(matches!(g.validate(), Err(ConfigError::InvalidStore(_))));
    }

    #[test]
    fn test_validate_rejects_unsorted_orbits() {
        let mut g = group();
        g.orbit_list.swap(0, 1);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
states:
  - state_id: 2
    orbit_list: [0]
    orbit_index: [1]
    tables:
      - clusters:
          - { channel: 3, cluster_id: 0, start: 2048, length: 10, integration_time: 1.0, readouts: 2 }
"#;
        let store = ConfigStore::from_yaml_str(yaml).unwrap();
        let g = store.state_group(2).unwrap();
        assert_eq!(g.tables[0].clusters[0].coadd_factor, 1);
        assert_eq!(g.tables[0].virtual_boundary, [0, 0]);
        assert!(store.state_group(3).is_none());
    }
}
