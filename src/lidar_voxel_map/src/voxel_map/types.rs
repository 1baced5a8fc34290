//! Type definitions for the voxel hash map.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Storage per point in a [`VoxelBlock`], excluding `Vec` slack.
///
/// The sequence number is 64-bit so it cannot wrap during a long run.
pub const BYTES_PER_POINT: usize =
    std::mem::size_of::<Vector3<f64>>() + std::mem::size_of::<u64>();

/// Configuration for a [`VoxelHashMap`](super::VoxelHashMap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelMapConfig {
    /// Voxel edge length in meters.
    pub voxel_size: f64,
    /// Maximum number of points stored per voxel. Further points are rejected.
    ///
    /// Each stored point costs [`BYTES_PER_POINT`] bytes: the coordinate plus
    /// the insertion sequence used to order equidistant neighbors.
    pub max_points_per_voxel: usize,
    /// How many cells outward (Chebyshev) a neighbor query inspects.
    pub neighbor_radius_voxels: u32,
    /// Minimum distance between a new point and the points already stored in
    /// its voxel. `0.0` disables the check.
    pub min_distance_points: f64,
}

impl Default for VoxelMapConfig {
    fn default() -> Self {
        Self {
            voxel_size: 1.0,
            max_points_per_voxel: 20,
            neighbor_radius_voxels: 1,
            min_distance_points: 0.0,
        }
    }
}

impl VoxelMapConfig {
    /// Create a configuration with a custom voxel size.
    pub fn with_voxel_size(voxel_size: f64) -> Self {
        Self {
            voxel_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(ConfigError::VoxelSize(self.voxel_size));
        }
        if self.max_points_per_voxel == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !(self.min_distance_points.is_finite() && self.min_distance_points >= 0.0) {
            return Err(ConfigError::MinDistance(self.min_distance_points));
        }
        Ok(())
    }

    /// Extent of the representable map along each axis, in meters.
    ///
    /// Voxel keys are 16-bit, so the grid spans `65536` cells per axis.
    pub fn max_extent(&self) -> f64 {
        65_536.0 * self.voxel_size
    }
}

/// Builder for [`VoxelMapConfig`].
#[derive(Debug, Clone, Default)]
pub struct VoxelMapBuilder {
    config: VoxelMapConfig,
}

impl VoxelMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voxel_size(mut self, voxel_size: f64) -> Self {
        self.config.voxel_size = voxel_size;
        self
    }

    pub fn max_points_per_voxel(mut self, max_points: usize) -> Self {
        self.config.max_points_per_voxel = max_points;
        self
    }

    pub fn neighbor_radius_voxels(mut self, radius: u32) -> Self {
        self.config.neighbor_radius_voxels = radius;
        self
    }

    pub fn min_distance_points(mut self, min_distance: f64) -> Self {
        self.config.min_distance_points = min_distance;
        self
    }

    /// Validate and return the configuration.
    pub fn config(self) -> Result<VoxelMapConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validate the configuration and create an empty map.
    pub fn build(self) -> Result<super::VoxelHashMap, ConfigError> {
        super::VoxelHashMap::new(self.config)
    }
}

/// Points stored in one voxel, in insertion order.
///
/// Each point carries a map-wide insertion sequence number used to break
/// distance ties in queries.
#[derive(Debug, Clone, Default)]
pub struct VoxelBlock {
    points: Vec<Vector3<f64>>,
    sequence: Vec<u64>,
}

impl VoxelBlock {
    /// Stored map-frame coordinates, oldest first.
    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest squared distance from `point` to any stored point.
    pub fn min_squared_distance(&self, point: &Vector3<f64>) -> Option<f64> {
        self.points
            .iter()
            .map(|p| (p - point).norm_squared())
            .min_by(f64::total_cmp)
    }

    pub(crate) fn push(&mut self, point: Vector3<f64>, sequence: u64) {
        self.points.push(point);
        self.sequence.push(sequence);
    }

    pub(crate) fn iter_sequenced(&self) -> impl Iterator<Item = (&Vector3<f64>, u64)> {
        self.points.iter().zip(self.sequence.iter().copied())
    }
}

/// Result of inserting a single point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertOutcome {
    /// The point was appended to its voxel.
    Inserted,
    /// The voxel already holds `max_points_per_voxel` points.
    RejectedFull,
    /// The point is closer than `min_distance_points` to a stored point.
    RejectedTooClose,
}

impl InsertOutcome {
    pub fn is_inserted(self) -> bool {
        self == InsertOutcome::Inserted
    }
}

/// Counts for a batch merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub rejected_full: usize,
    pub rejected_too_close: usize,
}

impl MergeSummary {
    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::RejectedFull => self.rejected_full += 1,
            InsertOutcome::RejectedTooClose => self.rejected_too_close += 1,
        }
    }

    /// Total number of points not stored.
    pub fn rejected(&self) -> usize {
        self.rejected_full + self.rejected_too_close
    }

    pub fn total(&self) -> usize {
        self.inserted + self.rejected()
    }
}

/// Snapshot of map occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapStats {
    /// Number of occupied voxels.
    pub num_voxels: usize,
    /// Number of stored points across all voxels.
    pub num_points: usize,
    /// Voxels holding `max_points_per_voxel` points.
    pub full_voxels: usize,
    /// Mean points per occupied voxel.
    pub mean_occupancy: f64,
}
