//! Common types shared by the SCIAMACHY level-0 decode and calibration crates.

pub mod cluster;
pub mod constants;
pub mod flags;
pub mod source;
pub mod time;

pub use cluster::{ClusterDef, ClusterRecord, ClusterTable};
pub use constants::{
    channel_of_pixel, channel_pixel_range, CHANNEL_SIZE, IR_CHANNELS, NUM_CHANNELS, NUM_STATE_IDS,
    FIRST_IR_CHANNEL, SCIENCE_PIXELS, VARIABLE_DARK_PIXELS,
};
pub use flags::{CalibrationFlags, Corrections};
pub use source::SourceKind;
pub use time::Mjd;
