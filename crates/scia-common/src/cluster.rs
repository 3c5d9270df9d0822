//! Cluster definitions and per-state cluster records.

use serde::{Deserialize, Serialize};

use crate::constants::{CHANNEL_SIZE, NUM_CHANNELS};
use crate::flags::Corrections;
use crate::time::Mjd;

/// One detector cluster as configured for a (state, orbit).
///
/// `start_pixel` is channel-relative and ascending for every channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterDef {
    pub channel_id: u8,
    pub cluster_id: u8,
    pub start_pixel: u16,
    pub length: u16,
    /// Seconds.
    pub integration_time: f32,
    pub coadd_factor: u16,
    pub readout_count: u16,
}

impl ClusterDef {
    /// Global science-pixel index of the first pixel.
    pub fn first_pixel(&self) -> usize {
        (self.channel_id as usize).saturating_sub(1) * CHANNEL_SIZE + self.start_pixel as usize
    }

    /// Channel-relative end pixel (exclusive).
    pub fn end_pixel(&self) -> usize {
        self.start_pixel as usize + self.length as usize
    }

    /// Whether this cluster produces any data.
    pub fn is_active(&self) -> bool {
        self.length > 0 && self.readout_count > 0
    }

    /// Whether two clusters share a pixel on the same channel.
    pub fn overlaps(&self, other: &ClusterDef) -> bool {
        self.channel_id == other.channel_id
            && (self.start_pixel as usize) < other.end_pixel()
            && (other.start_pixel as usize) < self.end_pixel()
    }
}

/// All clusters of one resolved (state, orbit) configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterTable {
    pub clusters: Vec<ClusterDef>,
    /// Virtual channel boundaries of channels 1 and 2 (channel-relative).
    pub virtual_boundary: [u16; 2],
}

impl ClusterTable {
    pub fn new(clusters: Vec<ClusterDef>, virtual_boundary: [u16; 2]) -> Self {
        Self {
            clusters,
            virtual_boundary,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Check the partition invariant.
    ///
    /// Every cluster lies on a valid channel, inside the channel, does not
    /// overlap another cluster of the same channel, and has a non-zero length
    /// whenever it is read out.
    pub fn validate(&self) -> Result<(), String> {
        for (i, def) in self.clusters.iter().enumerate() {
            if def.channel_id == 0 || def.channel_id as usize > NUM_CHANNELS {
                return Err(format!("cluster {} has invalid channel {}", i, def.channel_id));
            }
            if def.readout_count > 0 && def.length == 0 {
                return Err(format!(
                    "cluster {} (channel {}) is read out but has zero length",
                    def.cluster_id, def.channel_id
                ));
            }
            if def.end_pixel() > CHANNEL_SIZE {
                return Err(format!(
                    "cluster {} (channel {}) ends at pixel {} beyond channel size",
                    def.cluster_id,
                    def.channel_id,
                    def.end_pixel()
                ));
            }
            for other in &self.clusters[i + 1..] {
                if def.overlaps(other) {
                    return Err(format!(
                        "clusters {} and {} overlap on channel {}",
                        def.cluster_id, other.cluster_id, def.channel_id
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Decoded pixel data of one cluster during one state.
///
/// `pixel_values` is observation-major: the value of pixel `p` in
/// observation `o` sits at `o * num_pixels + p`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub channel_id: u8,
    pub cluster_id: u8,
    pub timestamp: Mjd,
    pub integration_time: f32,
    pub coadd_factor: u16,
    pub num_observations: usize,
    pub num_pixels: usize,
    /// Global science-pixel index per pixel.
    pub pixel_ids: Vec<u16>,
    pub pixel_values: Vec<f32>,
    pub applied: Corrections,
}

impl ClusterRecord {
    /// Pixel values of one observation.
    pub fn observation(&self, index: usize) -> Option<&[f32]> {
        if index >= self.num_observations {
            return None;
        }
        let start = index * self.num_pixels;
        self.pixel_values.get(start..start + self.num_pixels)
    }

    /// Iterate mutably over observations.
    pub fn observations_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let width = self.num_pixels.max(1);
        self.pixel_values.chunks_exact_mut(width)
    }

    /// Expected length of `pixel_values`.
    pub fn expected_len(&self) -> usize {
        self.num_observations * self.num_pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(channel_id: u8, cluster_id: u8, start_pixel: u16, length: u16) -> ClusterDef {
        ClusterDef {
            channel_id,
            cluster_id,
            start_pixel,
            length,
            integration_time: 1.0,
            coadd_factor: 1,
            readout_count: 1,
        }
    }

    #[test]
    fn test_first_pixel() {
        assert_eq!(def(1, 0, 5, 10).first_pixel(), 5);
        assert_eq!(def(3, 0, 5, 10).first_pixel(), 2053);
    }

    #[test]
    fn test_overlap() {
        assert!(def(1, 0, 0, 10).overlaps(&def(1, 1, 9, 5)));
        assert!(!def(1, 0, 0, 10).overlaps(&def(1, 1, 10, 5)));
        assert!(!def(1, 0, 0, 10).overlaps(&def(2, 1, 0, 10)));
    }

    #[test]
    fn test_validate_partition() {
        let table = ClusterTable::new(vec![def(1, 0, 0, 512), def(1, 1, 512, 512)], [552, 0]);
        assert!(table.validate().is_ok());

        let overlapping = ClusterTable::new(vec![def(1, 0, 0, 513), def(1, 1, 512, 512)], [0, 0]);
        assert!(overlapping.validate().is_err());

        let too_long = ClusterTable::new(vec![def(4, 0, 1000, 30)], [0, 0]);
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_observation_slices() {
        let record = ClusterRecord {
            channel_id: 1,
            cluster_id: 0,
            timestamp: Mjd::default(),
            integration_time: 1.0,
            coadd_factor: 1,
            num_observations: 2,
            num_pixels: 3,
            pixel_ids: vec![0, 1, 2],
            pixel_values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            applied: Corrections::empty(),
        };
        assert_eq!(record.observation(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(record.observation(2), None);
    }
}
