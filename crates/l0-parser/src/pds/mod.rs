//! ENVISAT PDS product navigation.
//!
//! A product starts with the ASCII main product header (MPH), followed by
//! the specific product header (SPH) whose tail holds the data set
//! descriptors (DSDs). Each DSD names a binary region of the file.

mod dsd;
mod header;

pub use dsd::{locate, read_directory, DsdEntry};
pub use header::{HeaderFields, MainHeader, MPH_SIZE};

use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use crate::{L0Error, Result};

/// Measurement data set holding all source packets.
pub const SOURCE_PACKETS: &str = "SCIAMACHY_SOURCE_PACKETS";
/// Constant dark (analog offset and leakage current) calibration.
pub const LEAKAGE_CONSTANT: &str = "LEAKAGE_CONSTANT";
/// Orbit-phase dependent dark calibration.
pub const LEAKAGE_VARIABLE: &str = "LEAKAGE_VARIABLE";
/// Solar mean reference spectrum.
pub const SUN_REFERENCE: &str = "SUN_REFERENCE";
/// Per-pixel wavelength grid.
pub const SPECTRAL_CALIBRATION: &str = "SPECTRAL_CALIBRATION";

/// A named binary region of a product.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub entry: DsdEntry,
    pub data: Bytes,
}

impl Dataset {
    /// Fixed-size records of the data set.
    ///
    /// Fails for variable-size data sets and when the data set is shorter
    /// than `record_count * record_size`.
    pub fn records(&self) -> Result<impl Iterator<Item = Bytes> + '_> {
        let size = self.entry.record_size.ok_or_else(|| {
            L0Error::invalid_format(format!("{} has variable-size records", self.entry.name))
        })? as usize;
        let count = self.entry.record_count as usize;
        let needed = size * count;
        if needed > self.data.len() {
            return Err(L0Error::Truncated {
                context: "data set records",
                offset: self.entry.offset as usize,
                needed,
                available: self.data.len(),
            });
        }
        Ok((0..count).map(move |i| self.data.slice(i * size..(i + 1) * size)))
    }
}

/// An opened level-0 product.
#[derive(Debug, Clone)]
pub struct Product {
    data: Bytes,
    mph: MainHeader,
    directory: Vec<DsdEntry>,
}

impl Product {
    /// Read a product from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), size = data.len(), "Read product");
        Self::from_bytes(Bytes::from(data))
    }

    /// Parse headers and directory of an in-memory product.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let mph = MainHeader::parse(&data)?;
        let directory = dsd::directory_from_header(&data, &mph)?;
        Ok(Self {
            data,
            mph,
            directory,
        })
    }

    pub fn header(&self) -> &MainHeader {
        &self.mph
    }

    pub fn absolute_orbit(&self) -> u16 {
        self.mph.abs_orbit
    }

    pub fn product_name(&self) -> &str {
        &self.mph.product
    }

    pub fn directory(&self) -> &[DsdEntry] {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte window of a named data set.
    pub fn dataset(&self, name: &str) -> Result<Dataset> {
        let entry = locate(&self.directory, name)?.clone();
        if entry.end() > self.data.len() as u64 {
            return Err(L0Error::Truncated {
                context: "data set",
                offset: entry.offset as usize,
                needed: entry.size as usize,
                available: self.data.len().saturating_sub(entry.offset as usize),
            });
        }
        let data = self
            .data
            .slice(entry.offset as usize..entry.end() as usize);
        Ok(Dataset { entry, data })
    }

    /// Like [`Product::dataset`], mapping an absent data set to `None`.
    pub fn optional_dataset(&self, name: &str) -> Result<Option<Dataset>> {
        match self.dataset(name) {
            Ok(ds) => Ok(Some(ds)),
            Err(L0Error::NotFound(_)) => {
                debug!(name, "Optional data set absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
