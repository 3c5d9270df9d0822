//! Bounds-checked primitive reads from byte windows.
//!
//! Every read advances the cursor by the width of the type and fails with
//! [`L0Error::Truncated`] instead of reading past the window. Byte order is a
//! runtime parameter; level-0 data is big-endian throughout.

use crate::{L0Error, Result};

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Cursor over a byte window.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    order: ByteOrder,
    context: &'static str,
}

impl<'a> ByteCursor<'a> {
    /// Big-endian cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            order: ByteOrder::Big,
            context: "byte window",
        }
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Name reported in `Truncated` errors.
    pub fn with_context(mut self, context: &'static str) -> Self {
        self.context = context;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    fn truncated(&self, needed: usize) -> L0Error {
        L0Error::Truncated {
            context: self.context,
            offset: self.pos,
            needed,
            available: self.remaining(),
        }
    }

    /// Move to an absolute position inside the window.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(L0Error::Truncated {
                context: self.context,
                offset: pos,
                needed: 0,
                available: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Borrow the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.truncated(n));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take::<2>()?;
        Ok(match self.order {
            ByteOrder::Big => u16::from_be_bytes(b),
            ByteOrder::Little => u16::from_le_bytes(b),
        })
    }

    /// Unsigned 24-bit integer, widened to `u32`.
    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take::<3>()?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes([0, b[0], b[1], b[2]]),
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], 0]),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take::<4>()?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes(b),
            ByteOrder::Little => u32::from_le_bytes(b),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read `count` consecutive floats.
    pub fn read_f32_vec(&mut self, count: usize) -> Result<Vec<f32>> {
        let needed = count
            .checked_mul(4)
            .ok_or_else(|| L0Error::invalid_format(format!("float array of {} elements", count)))?;
        if needed > self.remaining() {
            return Err(self.truncated(needed));
        }
        let mut values = Vec::new();
        values.try_reserve_exact(count).map_err(|_| L0Error::Alloc(count))?;
        for _ in 0..count {
            values.push(self.read_f32()?);
        }
        Ok(values)
    }
}

/// Read a big-endian `u16`, ignoring the cursor's configured order.
pub fn read_be_u16(cursor: &mut ByteCursor<'_>) -> Result<u16> {
    let b = cursor.take::<2>()?;
    Ok(u16::from_be_bytes(b))
}

/// Read a big-endian `u32`, ignoring the cursor's configured order.
pub fn read_be_u32(cursor: &mut ByteCursor<'_>) -> Result<u32> {
    let b = cursor.take::<4>()?;
    Ok(u32::from_be_bytes(b))
}

/// Read a big-endian IEEE-754 `f32`, ignoring the cursor's configured order.
pub fn read_be_f32(cursor: &mut ByteCursor<'_>) -> Result<f32> {
    read_be_u32(cursor).map(f32::from_bits)
}

// ===== Encoding =====

pub fn write_u16(order: ByteOrder, value: u16, buf: &mut Vec<u8>) {
    match order {
        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Write the low 24 bits of `value`.
pub fn write_u24(order: ByteOrder, value: u32, buf: &mut Vec<u8>) {
    let b = value.to_be_bytes();
    match order {
        ByteOrder::Big => buf.extend_from_slice(&b[1..]),
        ByteOrder::Little => buf.extend_from_slice(&[b[3], b[2], b[1]]),
    }
}

pub fn write_u32(order: ByteOrder, value: u32, buf: &mut Vec<u8>) {
    match order {
        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
    }
}

pub fn write_f32(order: ByteOrder, value: f32, buf: &mut Vec<u8>) {
    write_u32(order, value.to_bits(), buf)
}
