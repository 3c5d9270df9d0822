//! Detector sample unpacking.
//!
//! Samples are unsigned big-endian integers:
//! - 2 bytes per pixel for single readouts (coadd factor 1)
//! - 3 bytes per pixel for coadded readouts (coadd factor > 1)
//!
//! Values are widened to `f32` as-is; coadd normalization belongs to
//! calibration.

use crate::codec::ByteCursor;
use crate::{L0Error, Result};

/// Sample width in bytes for a coadd factor.
pub fn sample_width(coadd_factor: u16) -> usize {
    if coadd_factor > 1 {
        3
    } else {
        2
    }
}

/// Unpack `count` samples of `width` bytes, appending them to `out`.
pub fn unpack_into(packed: &[u8], count: usize, width: usize, out: &mut Vec<f32>) -> Result<()> {
    if width != 2 && width != 3 {
        return Err(L0Error::invalid_format(format!("sample width {}", width)));
    }
    out.try_reserve(count).map_err(|_| L0Error::Alloc(count))?;

    let mut cursor = ByteCursor::new(packed).with_context("cluster samples");
    for _ in 0..count {
        let raw = if width == 2 {
            cursor.read_u16()? as u32
        } else {
            cursor.read_u24()?
        };
        out.push(raw as f32);
    }
    Ok(())
}

/// Unpack all samples of a cluster block.
pub fn unpack_samples(packed: &[u8], count: usize, coadd_factor: u16) -> Result<Vec<f32>> {
    let mut values = Vec::new();
    unpack_into(packed, count, sample_width(coadd_factor), &mut values)?;
    Ok(values)
}
