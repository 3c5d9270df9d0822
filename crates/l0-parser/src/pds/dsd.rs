//! Data set descriptors.

use tracing::debug;

use super::header::{HeaderFields, MainHeader, MPH_SIZE};
use crate::{L0Error, Result};

/// One entry of the product directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsdEntry {
    pub name: String,
    /// `M` (measurement), `A` (annotation), `G` (global annotation) or `R` (reference).
    pub ds_type: char,
    pub offset: u64,
    pub size: u64,
    pub record_count: u32,
    /// `None` for variable-size records.
    pub record_size: Option<u32>,
}

impl DsdEntry {
    /// Parse one DSD record.
    ///
    /// Returns `Ok(None)` for spare records (empty `DS_NAME`).
    pub fn parse(record: &[u8]) -> Result<Option<Self>> {
        let fields = HeaderFields::parse(record);
        let name = match fields.get("DS_NAME") {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Ok(None),
        };

        let ds_type = fields.get("DS_TYPE").and_then(|t| t.chars().next()).unwrap_or(' ');
        let offset = non_negative_u64(&fields, "DS_OFFSET", &name)?;
        let size = non_negative_u64(&fields, "DS_SIZE", &name)?;
        let record_count = u32::try_from(fields.require_i64("NUM_DSR")?)
            .map_err(|_| L0Error::invalid_format(format!("{}: bad NUM_DSR", name)))?;
        let record_size = match fields.require_i64("DSR_SIZE")? {
            -1 => None,
            v => Some(
                u32::try_from(v)
                    .map_err(|_| L0Error::invalid_format(format!("{}: bad DSR_SIZE {}", name, v)))?,
            ),
        };

        Ok(Some(Self {
            name,
            ds_type,
            offset,
            size,
            record_count,
            record_size,
        }))
    }

    /// End offset (exclusive) of the data set.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

fn non_negative_u64(fields: &HeaderFields, key: &str, name: &str) -> Result<u64> {
    let value = fields.require_i64(key)?;
    u64::try_from(value)
        .map_err(|_| L0Error::invalid_format(format!("{}: negative {} {}", name, key, value)))
}

/// Read the data set directory of a product.
///
/// The DSD records occupy the last `NUM_DSD * DSD_SIZE` bytes of the SPH,
/// which follows the MPH.
pub fn read_directory(file: &[u8]) -> Result<Vec<DsdEntry>> {
    let mph = MainHeader::parse(file)?;
    directory_from_header(file, &mph)
}

pub(crate) fn directory_from_header(file: &[u8], mph: &MainHeader) -> Result<Vec<DsdEntry>> {
    if mph.dsd_size == 0 && mph.num_dsd > 0 {
        return Err(L0Error::invalid_format("DSD_SIZE is zero"));
    }
    let dsd_bytes = mph
        .num_dsd
        .checked_mul(mph.dsd_size)
        .ok_or_else(|| L0Error::invalid_format("DSD table size overflows"))?;
    if dsd_bytes > mph.sph_size {
        return Err(L0Error::invalid_format(format!(
            "{} DSDs of {} bytes do not fit in a {} byte SPH",
            mph.num_dsd, mph.dsd_size, mph.sph_size
        )));
    }

    let sph_end = MPH_SIZE + mph.sph_size;
    if sph_end > file.len() {
        return Err(L0Error::Truncated {
            context: "specific product header",
            offset: MPH_SIZE,
            needed: mph.sph_size,
            available: file.len().saturating_sub(MPH_SIZE),
        });
    }

    let table = &file[sph_end - dsd_bytes..sph_end];
    let mut entries = Vec::with_capacity(mph.num_dsd);
    for record in table.chunks_exact(mph.dsd_size.max(1)) {
        if let Some(entry) = DsdEntry::parse(record)? {
            debug!(
                name = %entry.name,
                offset = entry.offset,
                size = entry.size,
                records = entry.record_count,
                "Found data set"
            );
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Find a data set by name.
pub fn locate<'a>(directory: &'a [DsdEntry], name: &str) -> Result<&'a DsdEntry> {
    directory
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| L0Error::not_found(name))
}
