//! Common test fixtures.
//!
//! Provides cluster layouts, store documents and orbit numbers shared by the
//! parser, resolver and calibration test suites.

/// Orbit numbers used across tests.
pub mod orbits {
    /// An orbit covered by the first row of every fixture group.
    pub const EARLY: u16 = 1200;
    /// An orbit whose state 1 row is marked unresolved.
    pub const UNRESOLVED: u16 = 3500;
    /// An orbit covered by the second state 1 table.
    pub const LATE: u16 = 5200;
}

/// Cluster layouts.
pub mod clusters {
    use scia_common::ClusterDef;

    /// Two clusters on channel 1, four pixels each, the second coadded.
    ///
    /// Integration time is 0.5 s for both, one readout per state.
    pub fn two_cluster_defs() -> Vec<ClusterDef> {
        vec![
            ClusterDef {
                channel_id: 1,
                cluster_id: 0,
                start_pixel: 0,
                length: 4,
                integration_time: 0.5,
                coadd_factor: 1,
                readout_count: 1,
            },
            ClusterDef {
                channel_id: 1,
                cluster_id: 1,
                start_pixel: 4,
                length: 4,
                integration_time: 0.5,
                coadd_factor: 2,
                readout_count: 1,
            },
        ]
    }

    /// A single cluster on `channel_id` covering `length` pixels from `start_pixel`.
    pub fn single(channel_id: u8, start_pixel: u16, length: u16, integration_time: f32) -> ClusterDef {
        ClusterDef {
            channel_id,
            cluster_id: 0,
            start_pixel,
            length,
            integration_time,
            coadd_factor: 1,
            readout_count: 1,
        }
    }
}

/// Configuration store documents.
pub mod store {
    /// A store covering nadir state 1, dark state 8 and limb state 28.
    ///
    /// State 1: orbits 0.. use table 1, 3000.. are unresolved, 5000.. use
    /// table 2. State 8 executes no clusters. State 28 starts at orbit 1000.
    pub const CLUSTER_STORE_YAML: &str = r#"
states:
  - state_id: 1
    orbit_list: [0, 3000, 5000]
    orbit_index: [1, 255, 2]
    tables:
      - virtual_boundary: [552, 200]
        clusters:
          - { channel: 1, cluster_id: 0, start: 0, length: 4, integration_time: 0.5, coadd_factor: 1, readouts: 1 }
          - { channel: 1, cluster_id: 1, start: 4, length: 4, integration_time: 0.5, coadd_factor: 2, readouts: 1 }
          - { channel: 2, cluster_id: 2, start: 1024, length: 16, integration_time: 0.5, coadd_factor: 1, readouts: 1 }
      - virtual_boundary: [552, 200]
        clusters:
          - { channel: 1, cluster_id: 0, start: 0, length: 8, integration_time: 0.25, coadd_factor: 1, readouts: 2 }
  - state_id: 8
    orbit_list: [0]
    orbit_index: [0]
  - state_id: 28
    orbit_list: [1000]
    orbit_index: [1]
    tables:
      - clusters:
          - { channel: 6, cluster_id: 0, start: 5120, length: 32, integration_time: 0.125, coadd_factor: 1, readouts: 24 }
"#;

    /// The same store as JSON, with only state 8.
    pub const EMPTY_STATE_STORE_JSON: &str = r#"{
  "states": [
    { "state_id": 8, "orbit_list": [0], "orbit_index": [0] }
  ]
}"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_cluster_defs_partition_channel() {
        let defs = clusters::two_cluster_defs();
        assert!(!defs[0].overlaps(&defs[1]));
        assert!(defs[1].coadd_factor > 1);
    }

    #[test]
    fn test_orbit_order() {
        assert!(orbits::EARLY < orbits::UNRESOLVED);
        assert!(orbits::UNRESOLVED < orbits::LATE);
    }
}
