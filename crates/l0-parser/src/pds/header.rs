//! ASCII `KEY=value` header parsing (MPH, SPH and DSD records).

use std::collections::HashMap;

use crate::{L0Error, Result};

/// Size of the main product header.
pub const MPH_SIZE: usize = 1247;

/// Parsed `KEY=value` pairs of one header block.
#[derive(Debug, Clone, Default)]
pub struct HeaderFields {
    fields: HashMap<String, String>,
}

impl HeaderFields {
    /// Parse newline separated `KEY=value` lines.
    ///
    /// Surrounding quotes and a trailing `<unit>` suffix are removed from the
    /// value. Lines without `=` (padding, spare lines) are ignored.
    pub fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut fields = HashMap::new();

        for line in text.split('\n') {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            fields.insert(key.to_string(), clean_value(value));
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| L0Error::invalid_format(format!("header key {} missing", key)))
    }

    /// Signed decimal value such as `+0000001234`.
    pub fn require_i64(&self, key: &str) -> Result<i64> {
        let raw = self.require(key)?;
        parse_signed(raw)
            .ok_or_else(|| L0Error::invalid_format(format!("header key {}: bad number {:?}", key, raw)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn clean_value(raw: &str) -> String {
    let mut value = raw.trim();
    if let Some(idx) = value.find('<') {
        value = &value[..idx];
    }
    value.trim().trim_matches('"').trim().to_string()
}

fn parse_signed(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    digits.parse::<i64>().ok()
}

/// Main product header fields needed to navigate a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainHeader {
    pub product: String,
    pub abs_orbit: u16,
    pub sph_size: usize,
    pub num_dsd: usize,
    pub dsd_size: usize,
}

impl MainHeader {
    /// Parse the MPH at the start of a product.
    pub fn parse(file: &[u8]) -> Result<Self> {
        if file.len() < MPH_SIZE {
            return Err(L0Error::Truncated {
                context: "main product header",
                offset: 0,
                needed: MPH_SIZE,
                available: file.len(),
            });
        }
        let fields = HeaderFields::parse(&file[..MPH_SIZE]);

        let abs_orbit = fields.require_i64("ABS_ORBIT")?;
        let abs_orbit = u16::try_from(abs_orbit)
            .map_err(|_| L0Error::invalid_format(format!("ABS_ORBIT {} out of range", abs_orbit)))?;

        Ok(Self {
            product: fields.get("PRODUCT").unwrap_or_default().to_string(),
            abs_orbit,
            sph_size: non_negative(&fields, "SPH_SIZE")?,
            num_dsd: non_negative(&fields, "NUM_DSD")?,
            dsd_size: non_negative(&fields, "DSD_SIZE")?,
        })
    }
}

fn non_negative(fields: &HeaderFields, key: &str) -> Result<usize> {
    let value = fields.require_i64(key)?;
    usize::try_from(value)
        .map_err(|_| L0Error::invalid_format(format!("header key {} is negative: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let block = b"PRODUCT=\"SCI_NL__0PNPDK20040101_000000\"\nABS_ORBIT=+09876\nSPH_SIZE=+0000001234<bytes>\n   \n";
        let fields = HeaderFields::parse(block);
        assert_eq!(fields.get("PRODUCT"), Some("SCI_NL__0PNPDK20040101_000000"));
        assert_eq!(fields.require_i64("ABS_ORBIT").unwrap(), 9876);
        assert_eq!(fields.require_i64("SPH_SIZE").unwrap(), 1234);
        assert!(fields.require("NUM_DSD").is_err());
    }

    #[test]
    fn test_negative_values() {
        let fields = HeaderFields::parse(b"DSR_SIZE=-0000000001<bytes>\n");
        assert_eq!(fields.require_i64("DSR_SIZE").unwrap(), -1);
    }

    #[test]
    fn test_short_mph() {
        assert!(matches!(
            MainHeader::parse(&[b' '; 100]),
            Err(L0Error::Truncated { .. })
        ));
    }
}
