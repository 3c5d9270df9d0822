//! SCIAMACHY level-0 product reader.
//!
//! Reads ENVISAT PDS products (MPH, SPH and data set descriptors), walks the
//! detector source packets of the measurement data set and decodes the
//! packed per-cluster sample streams into [`scia_common::ClusterRecord`]s.

pub mod codec;
pub mod datasets;
pub mod decoder;
pub mod error;
pub mod packets;
pub mod pds;
pub mod tables;
pub mod unpacking;

pub use codec::{read_be_f32, read_be_u16, read_be_u32, ByteCursor, ByteOrder};
pub use datasets::{LeakageConstant, SolarReferenceSpectrum, SpectralCalibration, VariableDarkRecord};
pub use decoder::{decode_state, decode_state_with_timing, DecodeWarning, DecodedState};
pub use error::{L0Error, Result};
pub use packets::{
    group_states, read_packets, ClusterBlock, DetectorPacket, PacketHeader, PacketType,
    SourcePacket, StatePackets,
};
pub use pds::{locate, read_directory, Dataset, DsdEntry, MainHeader, Product};
pub use tables::StateTimingTable;
