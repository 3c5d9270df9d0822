//! Detector geometry constants.

use std::ops::Range;

/// Number of science channels.
pub const NUM_CHANNELS: usize = 8;

/// Pixels per channel.
pub const CHANNEL_SIZE: usize = 1024;

/// Science pixels over all channels.
pub const SCIENCE_PIXELS: usize = NUM_CHANNELS * CHANNEL_SIZE;

/// State ids run 0..NUM_STATE_IDS; id 0 is never executed.
pub const NUM_STATE_IDS: usize = 70;

/// Channels 6, 7 and 8 carry an orbit-dependent dark signal.
pub const IR_CHANNELS: usize = 3;

/// Length of one variable-dark correction vector (channels 6-8).
pub const VARIABLE_DARK_PIXELS: usize = IR_CHANNELS * CHANNEL_SIZE;

/// First channel covered by the variable-dark correction.
pub const FIRST_IR_CHANNEL: u8 = 6;

/// Global science-pixel range of a channel (1-based channel id).
///
/// Returns `None` for channel ids outside 1..=8.
pub fn channel_pixel_range(channel_id: u8) -> Option<Range<usize>> {
    if channel_id == 0 || channel_id as usize > NUM_CHANNELS {
        return None;
    }
    let start = (channel_id as usize - 1) * CHANNEL_SIZE;
    Some(start..start + CHANNEL_SIZE)
}

/// Channel id (1-based) of a global science-pixel index.
pub fn channel_of_pixel(pixel: usize) -> Option<u8> {
    if pixel >= SCIENCE_PIXELS {
        return None;
    }
    Some((pixel / CHANNEL_SIZE) as u8 + 1)
}
