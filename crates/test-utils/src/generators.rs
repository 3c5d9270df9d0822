//! Synthetic level-0 products for tests.
//!
//! The builders write the same byte layout the parser reads: a 1247 byte
//! main product header, a specific product header ending in the data set
//! descriptor table, then the data sets back to back. Everything is
//! big-endian.

use std::path::Path;

use scia_common::{CHANNEL_SIZE, NUM_CHANNELS, SCIENCE_PIXELS, VARIABLE_DARK_PIXELS};

/// Size of the main product header.
pub const MPH_SIZE: usize = 1247;
/// Size of one data set descriptor record.
pub const DSD_SIZE: usize = 280;
/// Free text at the start of the SPH, before the descriptors.
const SPH_PREFIX_SIZE: usize = 98;

/// Wavelength range (nm) covered by each channel.
pub const CHANNEL_WAVELENGTHS: [(f32, f32); NUM_CHANNELS] = [
    (214.0, 334.0),
    (300.0, 412.0),
    (383.0, 628.0),
    (595.0, 812.0),
    (773.0, 1063.0),
    (971.0, 1773.0),
    (1934.0, 2044.0),
    (2259.0, 2386.0),
];

fn push_mjd(buf: &mut Vec<u8>, days: i32, seconds: u32, microseconds: u32) {
    buf.extend_from_slice(&days.to_be_bytes());
    buf.extend_from_slice(&seconds.to_be_bytes());
    buf.extend_from_slice(&microseconds.to_be_bytes());
}

/// Big-endian encoding of an `f32` slice.
pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

struct ClusterSpec {
    cluster_id: u8,
    coadd_factor: u8,
    start: u16,
    samples: Vec<u32>,
}

/// Builds one detector (or auxiliary) source packet record.
///
/// # Example
///
/// ```
/// use test_utils::DetectorPacketBuilder;
///
/// let record = DetectorPacketBuilder::new(1, 3)
///     .on_board_time(42)
///     .cluster(0, 1, 0, &[10, 20, 30])
///     .build();
/// assert_eq!(record.len(), 62 + 8 + 6);
/// ```
pub struct DetectorPacketBuilder {
    isp_time: (i32, u32, u32),
    state_id: u8,
    channel_id: u8,
    on_board_time: u32,
    bcps: u16,
    packet_type: u8,
    clusters: Vec<ClusterSpec>,
    corrupt_sync: bool,
}

impl DetectorPacketBuilder {
    pub fn new(state_id: u8, channel_id: u8) -> Self {
        Self {
            isp_time: (1460, 3600, 0),
            state_id,
            channel_id,
            on_board_time: 0,
            bcps: 0,
            packet_type: 1,
            clusters: Vec::new(),
            corrupt_sync: false,
        }
    }

    /// An auxiliary packet; it carries no detector body.
    pub fn auxiliary(state_id: u8) -> Self {
        let mut builder = Self::new(state_id, 0);
        builder.packet_type = 2;
        builder
    }

    pub fn isp_time(mut self, days: i32, seconds: u32, microseconds: u32) -> Self {
        self.isp_time = (days, seconds, microseconds);
        self
    }

    pub fn on_board_time(mut self, obt: u32) -> Self {
        self.on_board_time = obt;
        self
    }

    pub fn bcps(mut self, bcps: u16) -> Self {
        self.bcps = bcps;
        self
    }

    /// Add a cluster block; samples are written in readout order.
    pub fn cluster(mut self, cluster_id: u8, coadd_factor: u8, start: u16, samples: &[u32]) -> Self {
        self.clusters.push(ClusterSpec {
            cluster_id,
            coadd_factor,
            start,
            samples: samples.to_vec(),
        });
        self
    }

    /// Write a wrong channel sync word.
    pub fn corrupt_sync(mut self) -> Self {
        self.corrupt_sync = true;
        self
    }

    fn body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if self.packet_type != 1 {
            body.extend_from_slice(&[0u8; 16]);
            return body;
        }

        body.extend_from_slice(&self.bcps.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // pmtc

        let sync: u16 = if self.corrupt_sync { 0x1234 } else { 0xAAAA };
        body.extend_from_slice(&sync.to_be_bytes());
        let info = ((self.channel_id as u16) << 12) | (self.clusters.len() as u16 & 0xFF);
        body.extend_from_slice(&info.to_be_bytes());
        body.extend_from_slice(&self.bcps.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());

        for (block_nr, cluster) in self.clusters.iter().enumerate() {
            body.push(0xBB);
            body.push(block_nr as u8);
            body.push(cluster.cluster_id);
            body.push(cluster.coadd_factor);
            body.extend_from_slice(&cluster.start.to_be_bytes());
            body.extend_from_slice(&(cluster.samples.len() as u16).to_be_bytes());
            for &sample in &cluster.samples {
                if cluster.coadd_factor > 1 {
                    body.extend_from_slice(&sample.to_be_bytes()[1..]);
                } else {
                    body.extend_from_slice(&(sample as u16).to_be_bytes());
                }
            }
        }
        body
    }

    pub fn build(&self) -> Vec<u8> {
        let body = self.body();
        // Data field header (12 bytes) plus body follow the packet header.
        let after_header = 12 + body.len();

        let mut record = Vec::with_capacity(38 + after_header);
        let (days, seconds, micros) = self.isp_time;
        push_mjd(&mut record, days, seconds, micros);

        // FEP header: ground station time, isp_length, crc and rs error counts, spare.
        push_mjd(&mut record, days, seconds, micros);
        record.extend_from_slice(&((6 + after_header) as u16).to_be_bytes());
        record.extend_from_slice(&[0u8; 6]);

        record.extend_from_slice(&0x0D00u16.to_be_bytes()); // packet_id
        record.extend_from_slice(&0xC000u16.to_be_bytes()); // sequence_control
        record.extend_from_slice(&((after_header - 1) as u16).to_be_bytes());

        record.extend_from_slice(&(after_header as u16).to_be_bytes());
        record.push(0); // category
        record.push(self.state_id);
        record.extend_from_slice(&self.on_board_time.to_be_bytes());
        record.extend_from_slice(&0u16.to_be_bytes()); // rdv
        record.push(self.packet_type);
        record.push(0);

        record.extend_from_slice(&body);
        record
    }
}

struct DatasetSpec {
    name: String,
    ds_type: char,
    data: Vec<u8>,
    record_count: usize,
    record_size: Option<usize>,
}

/// Builds a complete product in memory.
///
/// # Example
///
/// ```
/// use test_utils::{DetectorPacketBuilder, ProductBuilder};
///
/// let bytes = ProductBuilder::new(12345)
///     .packets(vec![DetectorPacketBuilder::new(1, 1).build()])
///     .build();
/// assert!(bytes.len() > 1247);
/// ```
pub struct ProductBuilder {
    product: String,
    abs_orbit: u16,
    datasets: Vec<DatasetSpec>,
    spare_dsds: usize,
}

impl ProductBuilder {
    pub fn new(abs_orbit: u16) -> Self {
        Self {
            product: "SCI_NL__0PNPDK20040101_000000_000060002345_00100_12345_0000.N1".to_string(),
            abs_orbit,
            datasets: Vec::new(),
            spare_dsds: 1,
        }
    }

    pub fn product_name(mut self, name: &str) -> Self {
        self.product = name.to_string();
        self
    }

    /// Add a data set of fixed-size records.
    pub fn fixed_dataset(mut self, name: &str, ds_type: char, records: Vec<Vec<u8>>) -> Self {
        let record_size = records.first().map(Vec::len).unwrap_or(0);
        let record_count = records.len();
        self.datasets.push(DatasetSpec {
            name: name.to_string(),
            ds_type,
            data: records.concat(),
            record_count,
            record_size: Some(record_size),
        });
        self
    }

    /// Add the measurement data set of source packets.
    pub fn packets(mut self, records: Vec<Vec<u8>>) -> Self {
        let record_count = records.len();
        self.datasets.push(DatasetSpec {
            name: "SCIAMACHY_SOURCE_PACKETS".to_string(),
            ds_type: 'M',
            data: records.concat(),
            record_count,
            record_size: None,
        });
        self
    }

    /// Add `LEAKAGE_CONSTANT` with zero errors and noise.
    pub fn leakage_constant(self, analog_offset: &[f32], dark_current: &[f32]) -> Self {
        let zeros = vec![0.0f32; SCIENCE_PIXELS];
        let record = [
            f32_bytes(analog_offset),
            f32_bytes(&zeros),
            f32_bytes(dark_current),
            f32_bytes(&zeros),
            f32_bytes(&zeros),
        ]
        .concat();
        self.fixed_dataset("LEAKAGE_CONSTANT", 'G', vec![record])
    }

    /// Add `LEAKAGE_VARIABLE`, one record per `(phase, channels 6-8 table)`.
    pub fn leakage_variable(self, rows: &[(f32, Vec<f32>)]) -> Self {
        let records = rows
            .iter()
            .map(|(phase, values)| {
                assert_eq!(values.len(), VARIABLE_DARK_PIXELS);
                let mut record = phase.to_be_bytes().to_vec();
                record.extend(f32_bytes(values));
                record
            })
            .collect();
        self.fixed_dataset("LEAKAGE_VARIABLE", 'G', records)
    }

    pub fn sun_reference(self, wavelength: &[f32], irradiance: &[f32], doppler: f32) -> Self {
        let mut record = f32_bytes(wavelength);
        record.extend(f32_bytes(irradiance));
        record.extend_from_slice(&doppler.to_be_bytes());
        self.fixed_dataset("SUN_REFERENCE", 'G', vec![record])
    }

    pub fn spectral_calibration(self, wavelength: &[f32]) -> Self {
        self.fixed_dataset("SPECTRAL_CALIBRATION", 'G', vec![f32_bytes(wavelength)])
    }

    fn main_header(&self, sph_size: usize, num_dsd: usize) -> Vec<u8> {
        let text = format!(
            "PRODUCT=\"{:<62}\"\nPROC_STAGE=N\nABS_ORBIT={:+06}\nTOT_SIZE={:+021}<bytes>\nSPH_SIZE={:+011}<bytes>\nNUM_DSD={:+011}\nDSD_SIZE={:+011}<bytes>\nNUM_DATA_SETS={:+011}\n",
            self.product,
            self.abs_orbit,
            0,
            sph_size,
            num_dsd,
            DSD_SIZE,
            self.datasets.len()
        );
        let mut bytes = text.into_bytes();
        bytes.resize(MPH_SIZE - 1, b' ');
        bytes.push(b'\n');
        bytes
    }

    /// Serialize the product.
    pub fn build(&self) -> Vec<u8> {
        let num_dsd = self.datasets.len() + self.spare_dsds;
        let sph_size = SPH_PREFIX_SIZE + num_dsd * DSD_SIZE;

        let mut out = self.main_header(sph_size, num_dsd);

        let mut sph = b"SPH_DESCRIPTOR=\"SCI_NL__0P SPECIFIC HEADER\"\n".to_vec();
        sph.resize(SPH_PREFIX_SIZE, b' ');
        let mut offset = MPH_SIZE + sph_size;
        for ds in &self.datasets {
            sph.extend(dsd_record(
                &ds.name,
                ds.ds_type,
                offset as i64,
                ds.data.len() as i64,
                ds.record_count as i64,
                ds.record_size.map(|s| s as i64).unwrap_or(-1),
            ));
            offset += ds.data.len();
        }
        for _ in 0..self.spare_dsds {
            let mut spare = b"DS_NAME=\"\"\n".to_vec();
            spare.resize(DSD_SIZE, b' ');
            sph.extend(spare);
        }
        out.extend(sph);

        for ds in &self.datasets {
            out.extend_from_slice(&ds.data);
        }
        out
    }

    /// Serialize the product to `path`.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }
}

/// One DSD record padded to [`DSD_SIZE`].
pub fn dsd_record(
    name: &str,
    ds_type: char,
    offset: i64,
    size: i64,
    record_count: i64,
    record_size: i64,
) -> Vec<u8> {
    let text = format!(
        "DS_NAME=\"{:<28}\"\nDS_TYPE={}\nFILENAME=\"{:<62}\"\nDS_OFFSET={:+021}<bytes>\nDS_SIZE={:+021}<bytes>\nNUM_DSR={:+011}\nDSR_SIZE={:+011}<bytes>\n",
        name, ds_type, "", offset, size, record_count, record_size
    );
    let mut bytes = text.into_bytes();
    bytes.resize(DSD_SIZE, b' ');
    bytes
}

/// Per-pixel wavelength grid in file order.
///
/// Channel 2 is stored with decreasing wavelength, as the detector is read
/// out from its top end.
pub fn wavelength_grid() -> Vec<f32> {
    let mut grid = Vec::with_capacity(SCIENCE_PIXELS);
    for (ch, &(lo, hi)) in CHANNEL_WAVELENGTHS.iter().enumerate() {
        let step = (hi - lo) / (CHANNEL_SIZE - 1) as f32;
        for i in 0..CHANNEL_SIZE {
            let k = if ch == 1 { CHANNEL_SIZE - 1 - i } else { i };
            grid.push(lo + step * k as f32);
        }
    }
    grid
}

/// Smooth positive irradiance spectrum over a wavelength grid.
pub fn solar_irradiance(wavelength: &[f32]) -> Vec<f32> {
    wavelength
        .iter()
        .map(|&wv| 2.0e14 + 5.0e13 * (wv / 40.0).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_length_field() {
        let record = DetectorPacketBuilder::new(1, 3).cluster(0, 2, 0, &[1, 2]).build();
        let packet_length = u16::from_be_bytes([record[36], record[37]]) as usize;
        assert_eq!(record.len(), 38 + packet_length + 1);
        // 3-byte samples when coadded
        assert_eq!(record.len(), 62 + 8 + 6);
    }

    #[test]
    fn test_channel_info_word() {
        let record = DetectorPacketBuilder::new(8, 7)
            .cluster(0, 1, 0, &[1])
            .cluster(1, 1, 1, &[1])
            .build();
        assert_eq!(&record[54..56], &[0xAA, 0xAA]);
        assert_eq!(u16::from_be_bytes([record[56], record[57]]), 0x7002);
    }

    #[test]
    fn test_product_layout() {
        let bytes = ProductBuilder::new(4321)
            .spectral_calibration(&wavelength_grid())
            .build();
        let sph_size = SPH_PREFIX_SIZE + 2 * DSD_SIZE;
        assert_eq!(bytes.len(), MPH_SIZE + sph_size + SCIENCE_PIXELS * 4);
        assert_eq!(bytes[MPH_SIZE - 1], b'\n');
        let header = String::from_utf8_lossy(&bytes[..MPH_SIZE]);
        assert!(header.contains("ABS_ORBIT=+04321"));
    }

    #[test]
    fn test_wavelength_grid_channel_two_descends() {
        let grid = wavelength_grid();
        assert_eq!(grid.len(), SCIENCE_PIXELS);
        assert!(grid[0] < grid[1]);
        assert!(grid[1024] > grid[1025]);
        assert!(grid[2048] < grid[2049]);
    }
}
