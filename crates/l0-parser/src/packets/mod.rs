//! Source packet parsing.
//!
//! Each record of the measurement data set is one instrument source packet
//! (ISP) preceded by its ENVISAT annotation. Layout (big-endian):
//!
//! ```text
//! offset size
//!      0   12  ISP sensing time (days i32, seconds u32, microseconds u32)
//!     12   20  FEP header (ground time, isp_length, crc_errs, rs_errs, spare)
//!     32    6  packet header (packet_id, sequence_control, packet_length)
//!     38   12  data field header (length, category, state_id, on_board_time,
//!              rdv, packet_type, spare)
//!     50    4  detector header (bcps, pmtc)
//!     54    8  channel header (sync 0xAAAA, info, bcps, ratio/frame)
//!     62    .  cluster blocks
//! ```
//!
//! `packet_length` counts the bytes after the packet header minus one, so a
//! record spans `38 + packet_length + 1` bytes.

use bytes::Bytes;
use scia_common::Mjd;
use tracing::{debug, warn};

use crate::codec::ByteCursor;
use crate::unpacking::sample_width;
use crate::{L0Error, Result};

/// Annotation + FEP + packet header.
pub const PRIMARY_HEADER_SIZE: usize = 38;
/// Offset of the detector header inside a record.
pub const DETECTOR_HEADER_OFFSET: usize = 50;
pub const CHANNEL_SYNC: u16 = 0xAAAA;
pub const CLUSTER_SYNC: u8 = 0xBB;
/// Bytes of a cluster block header.
pub const CLUSTER_HEADER_SIZE: usize = 8;

/// Packet type from the data field header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Detector,
    Auxiliary,
    Pmd,
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Detector,
            2 => Self::Auxiliary,
            3 => Self::Pmd,
            other => Self::Unknown(other),
        }
    }
}

/// Header fields common to all packet types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub isp_time: Mjd,
    pub packet_id: u16,
    pub sequence_control: u16,
    pub packet_length: u16,
    pub category: u8,
    pub state_id: u8,
    pub on_board_time: u32,
    pub packet_type: PacketType,
}

impl PacketHeader {
    /// Total record length including annotation and headers.
    pub fn record_len(&self) -> usize {
        PRIMARY_HEADER_SIZE + self.packet_length as usize + 1
    }
}

/// One cluster's samples within a detector packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterBlock {
    pub block_nr: u8,
    pub cluster_id: u8,
    pub coadd_factor: u8,
    pub start: u16,
    pub length: u16,
    /// Packed samples, 2 bytes each (3 when coadded).
    pub samples: Bytes,
}

impl ClusterBlock {
    pub fn sample_width(&self) -> usize {
        sample_width(self.coadd_factor as u16)
    }
}

/// A detector packet: one readout of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorPacket {
    pub header: PacketHeader,
    /// Broadcast pulse count of the readout (16 Hz).
    pub bcps: u16,
    pub channel_id: u8,
    pub clusters: Vec<ClusterBlock>,
}

impl DetectorPacket {
    pub fn state_id(&self) -> u8 {
        self.header.state_id
    }

    pub fn cluster(&self, cluster_id: u8) -> Option<&ClusterBlock> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }
}

/// Any packet of the measurement data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePacket {
    Detector(DetectorPacket),
    /// Auxiliary and PMD packets; only the header is kept.
    Other(PacketHeader),
    /// A detector packet whose body could not be parsed.
    Corrupt { header: PacketHeader, reason: String },
}

impl SourcePacket {
    pub fn header(&self) -> &PacketHeader {
        match self {
            Self::Detector(p) => &p.header,
            Self::Other(h) => h,
            Self::Corrupt { header, .. } => header,
        }
    }
}

fn read_mjd(cursor: &mut ByteCursor<'_>) -> Result<Mjd> {
    let days = cursor.read_i32()?;
    let seconds = cursor.read_u32()?;
    let microseconds = cursor.read_u32()?;
    Ok(Mjd::new(days, seconds, microseconds))
}

/// Parse the headers at the start of a record.
pub fn parse_header(record: &[u8]) -> Result<PacketHeader> {
    let mut cursor = ByteCursor::new(record).with_context("packet header");
    let isp_time = read_mjd(&mut cursor)?;
    // FEP header: ground station time, isp_length, crc/rs error counts, spare.
    cursor.skip(20)?;

    let packet_id = cursor.read_u16()?;
    let sequence_control = cursor.read_u16()?;
    let packet_length = cursor.read_u16()?;

    let _field_length = cursor.read_u16()?;
    let category = cursor.read_u8()?;
    let state_id = cursor.read_u8()?;
    let on_board_time = cursor.read_u32()?;
    let _rdv = cursor.read_u16()?;
    let packet_type = PacketType::from(cursor.read_u8()?);

    Ok(PacketHeader {
        isp_time,
        packet_id,
        sequence_control,
        packet_length,
        category,
        state_id,
        on_board_time,
        packet_type,
    })
}

/// Parse the detector body of a record whose header is already known.
fn parse_detector_body(record: &Bytes, header: PacketHeader) -> Result<DetectorPacket> {
    let mut cursor = ByteCursor::new(record).with_context("detector packet");
    cursor.seek(DETECTOR_HEADER_OFFSET)?;

    let bcps = cursor.read_u16()?;
    let _pmtc = cursor.read_u16()?;

    let sync = cursor.read_u16()?;
    if sync != CHANNEL_SYNC {
        return Err(L0Error::invalid_format(format!(
            "channel sync {:#06x}, expected {:#06x}",
            sync, CHANNEL_SYNC
        )));
    }
    let info = cursor.read_u16()?;
    let channel_id = (info >> 12) as u8;
    let num_clusters = (info & 0xFF) as usize;
    // Timestamps follow the detector-header BCPS; the channel copy is skipped.
    let _channel_bcps = cursor.read_u16()?;
    let _ratio_frame = cursor.read_u16()?;

    if channel_id == 0 || channel_id > 8 {
        return Err(L0Error::invalid_format(format!("channel id {}", channel_id)));
    }

    let mut clusters = Vec::with_capacity(num_clusters);
    for _ in 0..num_clusters {
        let sync = cursor.read_u8()?;
        if sync != CLUSTER_SYNC {
            return Err(L0Error::invalid_format(format!(
                "cluster sync {:#04x} at offset {}",
                sync,
                cursor.position() - 1
            )));
        }
        let block_nr = cursor.read_u8()?;
        let cluster_id = cursor.read_u8()?;
        let coadd_factor = cursor.read_u8()?;
        let start = cursor.read_u16()?;
        let length = cursor.read_u16()?;

        let width = sample_width(coadd_factor as u16);
        let offset = cursor.position();
        cursor.skip(length as usize * width)?;

        clusters.push(ClusterBlock {
            block_nr,
            cluster_id,
            coadd_factor,
            start,
            length,
            samples: record.slice(offset..cursor.position()),
        });
    }

    Ok(DetectorPacket {
        header,
        bcps,
        channel_id,
        clusters,
    })
}

/// Parse one complete record.
///
/// Header problems are errors; a malformed detector body yields
/// [`SourcePacket::Corrupt`] so that only the enclosing state is lost.
pub fn parse_packet(record: &Bytes) -> Result<SourcePacket> {
    let header = parse_header(record)?;
    if header.packet_type != PacketType::Detector {
        return Ok(SourcePacket::Other(header));
    }
    match parse_detector_body(record, header.clone()) {
        Ok(packet) => Ok(SourcePacket::Detector(packet)),
        Err(e @ L0Error::Alloc(_)) => Err(e),
        Err(e) => Ok(SourcePacket::Corrupt {
            header,
            reason: e.to_string(),
        }),
    }
}

/// Walk all records of the measurement data set.
///
/// A record extending past the data set is a fatal `Truncated` error.
pub fn read_packets(mds: &Bytes) -> Result<Vec<SourcePacket>> {
    let mut packets = Vec::new();
    let mut offset = 0usize;

    while offset < mds.len() {
        let header = parse_header(&mds[offset..])?;
        let len = header.record_len();
        if offset + len > mds.len() {
            return Err(L0Error::Truncated {
                context: "source packet",
                offset,
                needed: len,
                available: mds.len() - offset,
            });
        }
        let packet = parse_packet(&mds.slice(offset..offset + len))?;
        if let SourcePacket::Corrupt { header, reason } = &packet {
            warn!(
                state_id = header.state_id,
                on_board_time = header.on_board_time,
                offset,
                reason = %reason,
                "Corrupt detector packet"
            );
        }
        packets.push(packet);
        offset += len;
    }

    debug!(count = packets.len(), "Read source packets");
    Ok(packets)
}

/// Detector packets of one executed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePackets {
    pub state_id: u8,
    pub on_board_time: u32,
    /// Earliest ISP time of the state.
    pub start_time: Mjd,
    pub packets: Vec<DetectorPacket>,
    /// Number of detector packets that failed to parse.
    pub corrupt_packets: usize,
}

/// Group detector packets by executed state.
///
/// Packets sharing `(state_id, on_board_time)` belong to one state. The
/// result is sorted by state start time; packets within a state keep their
/// file order.
pub fn group_states(packets: Vec<SourcePacket>) -> Vec<StatePackets> {
    let mut states: Vec<StatePackets> = Vec::new();

    for packet in packets {
        let header = packet.header();
        let key = (header.state_id, header.on_board_time);
        let isp_time = header.isp_time;

        let idx = match states
            .iter()
            .rposition(|s| (s.state_id, s.on_board_time) == key)
        {
            Some(idx) => idx,
            None => {
                if matches!(packet, SourcePacket::Other(_)) {
                    continue;
                }
                states.push(StatePackets {
                    state_id: key.0,
                    on_board_time: key.1,
                    start_time: isp_time,
                    packets: Vec::new(),
                    corrupt_packets: 0,
                });
                states.len() - 1
            }
        };

        let state = &mut states[idx];
        match packet {
            SourcePacket::Detector(p) => {
                state.start_time = state.start_time.min(isp_time);
                state.packets.push(p);
            }
            SourcePacket::Corrupt { .. } => state.corrupt_packets += 1,
            SourcePacket::Other(_) => {}
        }
    }

    states.sort_by_key(|s| s.start_time);
    states
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(state_id: u8, obt: u32, seconds: u32) -> PacketHeader {
        PacketHeader {
            isp_time: Mjd::new(0, seconds, 0),
            packet_id: 0,
            sequence_control: 0,
            packet_length: 0,
            category: 0,
            state_id,
            on_board_time: obt,
            packet_type: PacketType::Detector,
        }
    }

    fn detector(state_id: u8, obt: u32, seconds: u32) -> SourcePacket {
        SourcePacket::Detector(DetectorPacket {
            header: header(state_id, obt, seconds),
            bcps: 0,
            channel_id: 1,
            clusters: Vec::new(),
        })
    }

    #[test]
    fn test_packet_type() {
        assert_eq!(PacketType::from(1), PacketType::Detector);
        assert_eq!(PacketType::from(3), PacketType::Pmd);
        assert_eq!(PacketType::from(9), PacketType::Unknown(9));
    }

    #[test]
    fn test_group_states_sorted_by_time() {
        let packets = vec![
            detector(8, 200, 50),
            detector(8, 200, 51),
            detector(2, 100, 10),
            SourcePacket::Corrupt {
                header: header(2, 100, 11),
                reason: "bad sync".into(),
            },
            detector(2, 100, 12),
        ];
        let states = group_states(packets);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].state_id, 2);
        assert_eq!(states[0].packets.len(), 2);
        assert_eq!(states[0].corrupt_packets, 1);
        assert_eq!(states[1].state_id, 8);
        assert_eq!(states[1].start_time, Mjd::new(0, 50, 0));
    }

    #[test]
    fn test_group_states_skips_orphan_aux_packets() {
        let mut aux = header(3, 1, 1);
        aux.packet_type = PacketType::Auxiliary;
        let states = group_states(vec![SourcePacket::Other(aux)]);
        assert!(states.is_empty());
    }

    #[test]
    fn test_detector_header_bcps_used_over_channel_copy() {
        let mut record = test_utils::DetectorPacketBuilder::new(1, 1)
            .bcps(24)
            .cluster(0, 1, 0, &[1, 2])
            .build();
        // channel header bcps sits at offset 58
        record[58..60].copy_from_slice(&99u16.to_be_bytes());

        match parse_packet(&Bytes::from(record)).unwrap() {
            SourcePacket::Detector(packet) => {
                assert_eq!(packet.bcps, 24);
                assert_eq!(packet.clusters[0].length, 2);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
