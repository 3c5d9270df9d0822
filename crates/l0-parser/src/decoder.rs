//! Per-state cluster decoding.
//!
//! Regroups the detector packets of one state by cluster and unpacks each
//! cluster's samples into a [`ClusterRecord`].

use scia_common::{ClusterDef, ClusterRecord, Corrections, Mjd};
use tracing::{debug, warn};

use crate::packets::{ClusterBlock, DetectorPacket};
use crate::tables::StateTimingTable;
use crate::unpacking::unpack_into;
use crate::{L0Error, Result};

/// Recoverable problems found while decoding a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    /// No packet of the state carries this cluster; the record is zero-filled.
    PartialState { channel_id: u8, cluster_id: u8 },
    /// A block disagrees with its definition; samples were truncated or padded.
    GeometryMismatch {
        channel_id: u8,
        cluster_id: u8,
        expected_length: u16,
        found_length: u16,
        expected_coadd: u16,
        found_coadd: u16,
    },
}

impl std::fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PartialState {
                channel_id,
                cluster_id,
            } => write!(
                f,
                "channel {} cluster {} absent from state packets",
                channel_id, cluster_id
            ),
            Self::GeometryMismatch {
                channel_id,
                cluster_id,
                expected_length,
                found_length,
                expected_coadd,
                found_coadd,
            } => write!(
                f,
                "channel {} cluster {}: length {} (expected {}), coadd {} (expected {})",
                channel_id, cluster_id, found_length, expected_length, found_coadd, expected_coadd
            ),
        }
    }
}

/// Records of one state plus the warnings raised while decoding them.
#[derive(Debug, Clone, Default)]
pub struct DecodedState {
    pub records: Vec<ClusterRecord>,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodedState {
    pub fn into_records(self) -> Vec<ClusterRecord> {
        self.records
    }
}

/// Cluster timestamp from the first packet contributing to it.
///
/// `isp_seconds + isp_microseconds / 1e6 + offset[state] / 256 + bcps / 16`
pub fn cluster_timestamp(packet: &DetectorPacket, timing: &StateTimingTable) -> Result<Mjd> {
    let state_id = packet.header.state_id;
    let offset = timing
        .offset_seconds(state_id)
        .ok_or_else(|| L0Error::invalid_format(format!("state id {} out of range", state_id)))?;
    let isp = packet.header.isp_time;
    let seconds_field = isp.seconds as f64
        + isp.microseconds as f64 / 1e6
        + offset
        + packet.bcps as f64 / 16.0;
    Ok(Mjd::from_day_seconds(isp.days, seconds_field))
}

fn allocate(len: usize) -> Result<Vec<f32>> {
    let mut values = Vec::new();
    values.try_reserve_exact(len).map_err(|_| L0Error::Alloc(len))?;
    Ok(values)
}

/// Append one observation of `def` taken from `block`.
///
/// Returns `true` when the block had to be truncated or padded.
fn push_observation(def: &ClusterDef, block: &ClusterBlock, values: &mut Vec<f32>) -> Result<bool> {
    let expected = def.length as usize;
    let available = block.length as usize;
    let take = expected.min(available);
    let start = values.len();

    unpack_into(&block.samples, take, block.sample_width(), values)?;
    values.resize(start + expected, 0.0);

    // Channel 2 is read out from the top of the detector.
    if def.channel_id == 2 {
        values[start..].reverse();
    }

    Ok(available != expected || block.coadd_factor as u16 != def.coadd_factor.max(1))
}

/// Decode all clusters of one state.
///
/// Inactive definitions (zero length or zero readouts) are skipped. A
/// definition that no packet carries produces a zero-filled record of
/// `readout_count` observations and a [`DecodeWarning::PartialState`].
pub fn decode_state(packets: &[DetectorPacket], defs: &[ClusterDef]) -> Result<DecodedState> {
    decode_state_with_timing(packets, defs, &StateTimingTable::default())
}

/// [`decode_state`] with an explicit per-state timing table.
pub fn decode_state_with_timing(
    packets: &[DetectorPacket],
    defs: &[ClusterDef],
    timing: &StateTimingTable,
) -> Result<DecodedState> {
    let mut state = DecodedState::default();

    for def in defs {
        if !def.is_active() {
            debug!(
                channel = def.channel_id,
                cluster = def.cluster_id,
                "Skipping inactive cluster"
            );
            continue;
        }

        let num_pixels = def.length as usize;
        let pixel_ids: Vec<u16> = (0..num_pixels)
            .map(|i| (def.first_pixel() + i) as u16)
            .collect();

        let matches: Vec<(&DetectorPacket, &ClusterBlock)> = packets
            .iter()
            .filter(|p| p.channel_id == def.channel_id)
            .filter_map(|p| p.cluster(def.cluster_id).map(|block| (p, block)))
            .collect();

        let Some(&(first_packet, first_block)) = matches.first() else {
            warn!(
                channel = def.channel_id,
                cluster = def.cluster_id,
                readouts = def.readout_count,
                "Cluster absent from state packets, zero-filling"
            );
            state.warnings.push(DecodeWarning::PartialState {
                channel_id: def.channel_id,
                cluster_id: def.cluster_id,
            });

            let len = def.readout_count as usize * num_pixels;
            let mut values = allocate(len)?;
            values.resize(len, 0.0);
            let timestamp = match packets.first() {
                Some(p) => cluster_timestamp(p, timing)?,
                None => Mjd::default(),
            };
            state.records.push(ClusterRecord {
                channel_id: def.channel_id,
                cluster_id: def.cluster_id,
                timestamp,
                integration_time: def.integration_time,
                coadd_factor: def.coadd_factor,
                num_observations: def.readout_count as usize,
                num_pixels,
                pixel_ids,
                pixel_values: values,
                applied: Corrections::empty(),
            });
            continue;
        };

        let num_observations = matches.len();
        let mut values = allocate(num_observations * num_pixels)?;
        let mut mismatched = false;
        for (_, block) in &matches {
            mismatched |= push_observation(def, block, &mut values)?;
        }

        if mismatched {
            let warning = DecodeWarning::GeometryMismatch {
                channel_id: def.channel_id,
                cluster_id: def.cluster_id,
                expected_length: def.length,
                found_length: first_block.length,
                expected_coadd: def.coadd_factor,
                found_coadd: first_block.coadd_factor as u16,
            };
            warn!(warning = %warning, "Cluster block does not match its definition");
            state.warnings.push(warning);
        }

        state.records.push(ClusterRecord {
            channel_id: def.channel_id,
            cluster_id: def.cluster_id,
            timestamp: cluster_timestamp(first_packet, timing)?,
            integration_time: def.integration_time,
            coadd_factor: def.coadd_factor,
            num_observations,
            num_pixels,
            pixel_ids,
            pixel_values: values,
            applied: Corrections::empty(),
        });
    }

    debug!(
        records = state.records.len(),
        warnings = state.warnings.len(),
        "Decoded state"
    );
    Ok(state)
}
