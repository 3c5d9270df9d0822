//! Fixed per-state lookup tables.
//!
//! The ride-along timing offsets are instrument timeline constants. No
//! authoritative per-state listing ships with this workspace, so the built-in
//! table is a placeholder of per-family values (nadir, limb, occultation,
//! monitoring). Deployments load the calibrated table through
//! [`StateTimingTable`] from configuration.

use scia_common::NUM_STATE_IDS;
use serde::{Deserialize, Serialize};

use crate::L0Error;

/// Placeholder ride-along offset of each state, in units of 1/256 second.
///
/// Indexed by state id; id 0 is never executed.
pub const STATE_TIMING_OFFSET: [u16; NUM_STATE_IDS] = [
    0, //  0
    128, 128, 128, 128, 128, 128, 128, //  1-7   nadir
    64, 64, 64, 64, 64, 64, 64, 64, //  8-15  dark
    64, 32, 32, 32, 32, 32, 32, // 16-22 monitoring
    96, 96, 96, 64, // 23-26
    160, 160, 160, 160, 160, 160, 160, // 27-33 limb
    160, 160, 160, 160, 160, 160, 160, // 34-40 limb
    160, 160, 160, 160, // 41-44 limb mesosphere
    32, 32, // 45-46
    48, 48, 48, 48, 48, // 47-51 occultation
    16, 16, 16, // 52-54 diffuser
    48, // 55    moon
    16, 16, 16, 16, 16, 16, 16, 16, 16, // 56-64
    128, // 65    nadir pole
    64, 64, 64, 64, // 66-69
];

/// Per-state timing offsets in 1/256 second ticks.
///
/// Serialized as a plain list of exactly one entry per state id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u16>", into = "Vec<u16>")]
pub struct StateTimingTable {
    ticks: [u16; NUM_STATE_IDS],
}

impl Default for StateTimingTable {
    fn default() -> Self {
        Self {
            ticks: STATE_TIMING_OFFSET,
        }
    }
}

impl StateTimingTable {
    pub fn from_ticks(ticks: &[u16]) -> Result<Self, L0Error> {
        let ticks: [u16; NUM_STATE_IDS] = ticks.try_into().map_err(|_| {
            L0Error::invalid_format(format!(
                "state timing table has {} entries, expected {}",
                ticks.len(),
                NUM_STATE_IDS
            ))
        })?;
        Ok(Self { ticks })
    }

    /// Timing offset of a state in seconds, `None` for unknown state ids.
    pub fn offset_seconds(&self, state_id: u8) -> Option<f64> {
        self.ticks
            .get(state_id as usize)
            .map(|&ticks| ticks as f64 / 256.0)
    }
}

impl TryFrom<Vec<u16>> for StateTimingTable {
    type Error = L0Error;

    fn try_from(ticks: Vec<u16>) -> Result<Self, Self::Error> {
        Self::from_ticks(&ticks)
    }
}

impl From<StateTimingTable> for Vec<u16> {
    fn from(table: StateTimingTable) -> Self {
        table.ticks.to_vec()
    }
}

/// Offset of a state from the built-in table, in seconds.
pub fn timing_offset_seconds(state_id: u8) -> Option<f64> {
    StateTimingTable::default().offset_seconds(state_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_all_states() {
        assert_eq!(STATE_TIMING_OFFSET.len(), 70);
        assert_eq!(timing_offset_seconds(1), Some(0.5));
        assert_eq!(timing_offset_seconds(69), Some(0.25));
        assert_eq!(timing_offset_seconds(70), None);
    }

    #[test]
    fn test_custom_table() {
        let mut ticks = vec![0u16; NUM_STATE_IDS];
        ticks[8] = 512;
        let table = StateTimingTable::from_ticks(&ticks).unwrap();
        assert_eq!(table.offset_seconds(8), Some(2.0));
        assert_eq!(table.offset_seconds(1), Some(0.0));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            StateTimingTable::from_ticks(&[1, 2, 3]),
            Err(L0Error::InvalidFormat(_))
        ));
    }
}
