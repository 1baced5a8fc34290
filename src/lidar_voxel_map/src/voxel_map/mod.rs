//! Voxel hash map of accumulated scan points.
//!
//! The map buckets map-frame points by the [`Voxel`] that contains them and
//! supports the operations the odometry loop needs between scans:
//!
//! - Insertion with a per-voxel capacity (first-seen points are kept)
//! - Nearest-neighbor and radius queries over a cube of neighboring voxels
//! - Whole-voxel eviction to bound memory as the sensor moves
//! - Batch merge of a registered scan
//!
//! # Example
//!
//! ```
//! use lidar_voxel_map::VoxelMapBuilder;
//! use nalgebra::Vector3;
//!
//! let mut map = VoxelMapBuilder::new()
//!     .voxel_size(1.0)
//!     .max_points_per_voxel(20)
//!     .build()
//!     .unwrap();
//!
//! map.insert(&Vector3::new(0.1, 0.2, 0.3)).unwrap();
//! let nearest = map.query_nearest(&Vector3::zeros(), 1).unwrap();
//! assert_eq!(nearest.len(), 1);
//! ```

pub mod key;
pub mod search;
pub mod shared;
pub mod types;

pub use key::{Voxel, VoxelBuildHasher, VoxelHasher, HASH_P1, HASH_P2, HASH_P3};
pub use shared::SharedVoxelMap;
pub use types::{
    InsertOutcome, MapStats, MergeSummary, VoxelBlock, VoxelMapBuilder, VoxelMapConfig,
    BYTES_PER_POINT,
};

use std::collections::HashMap;

use nalgebra::Vector3;
use tracing::{debug, trace, warn};

use crate::error::{ConfigError, KeyRangeError};
use crate::point::Point3D;

/// Spatial hash from [`Voxel`] to the points stored in that cell.
#[derive(Debug, Clone)]
pub struct VoxelHashMap {
    config: VoxelMapConfig,
    voxels: HashMap<Voxel, VoxelBlock, VoxelBuildHasher>,
    num_points: usize,
    /// Insertion counter shared by all voxels.
    next_sequence: u64,
}

impl Default for VoxelHashMap {
    fn default() -> Self {
        Self::from_valid_config(VoxelMapConfig::default())
    }
}

impl VoxelHashMap {
    /// Create an empty map, failing if the configuration is invalid.
    ///
    /// # Arguments
    /// * `config` - Grid resolution, per-voxel capacity and query radius
    ///
    /// # Example
    /// ```
    /// use lidar_voxel_map::{VoxelHashMap, VoxelMapConfig};
    ///
    /// let map = VoxelHashMap::new(VoxelMapConfig::with_voxel_size(0.5)).unwrap();
    /// assert!(map.is_empty());
    /// assert!(VoxelHashMap::new(VoxelMapConfig::with_voxel_size(0.0)).is_err());
    /// ```
    pub fn new(config: VoxelMapConfig) -> Result<Self, ConfigError> {
        if let Err(e) = config.validate() {
            debug!("rejected voxel map config: {e}");
            return Err(e);
        }
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: VoxelMapConfig) -> Self {
        Self {
            config,
            voxels: HashMap::default(),
            num_points: 0,
            next_sequence: 0,
        }
    }

    /// Configuration the map was created with.
    pub fn config(&self) -> &VoxelMapConfig {
        &self.config
    }

    /// Voxel side length in meters.
    pub fn voxel_size(&self) -> f64 {
        self.config.voxel_size
    }

    /// Voxel that contains `point` under this map's grid.
    pub fn voxel_of(&self, point: &Vector3<f64>) -> Result<Voxel, KeyRangeError> {
        Voxel::from_point(point, self.config.voxel_size)
    }

    /// Insert a map-frame coordinate.
    ///
    /// # Arguments
    /// * `point` - Motion-compensated coordinate in meters
    ///
    /// Capacity and minimum-distance rejections are reported through the
    /// returned [`InsertOutcome`]; only an out-of-range coordinate is an error,
    /// in which case the map is left unchanged.
    pub fn insert(&mut self, point: &Vector3<f64>) -> Result<InsertOutcome, KeyRangeError> {
        let voxel = self.voxel_of(point)?;
        Ok(self.insert_into(voxel, *point))
    }

    /// Insert the map-frame coordinate (`pt`) of a scan point.
    pub fn insert_point(&mut self, point: &Point3D) -> Result<InsertOutcome, KeyRangeError> {
        self.insert(point.pt())
    }

    fn insert_into(&mut self, voxel: Voxel, point: Vector3<f64>) -> InsertOutcome {
        let capacity = self.config.max_points_per_voxel;
        let min_distance = self.config.min_distance_points;

        let block = self.voxels.entry(voxel).or_default();
        if block.len() >= capacity {
            return InsertOutcome::RejectedFull;
        }
        if min_distance > 0.0
            && block
                .min_squared_distance(&point)
                .is_some_and(|d| d < min_distance * min_distance)
        {
            return InsertOutcome::RejectedTooClose;
        }

        block.push(point, self.next_sequence);
        self.next_sequence += 1;
        self.num_points += 1;
        if block.len() == capacity {
            trace!(%voxel, capacity, "voxel reached capacity");
        }
        InsertOutcome::Inserted
    }

    /// Merge the points of a registered scan.
    ///
    /// Every key is computed before anything is inserted, so an out-of-range
    /// point fails the whole batch and leaves the map unchanged.
    pub fn merge<'a, I>(&mut self, points: I) -> Result<MergeSummary, KeyRangeError>
    where
        I: IntoIterator<Item = &'a Point3D>,
    {
        self.merge_positions(points.into_iter().map(|p| *p.pt()))
    }

    /// Merge plain map-frame coordinates with the same policy as [`merge`](Self::merge).
    pub fn merge_positions<I>(&mut self, points: I) -> Result<MergeSummary, KeyRangeError>
    where
        I: IntoIterator<Item = Vector3<f64>>,
    {
        let keyed = points
            .into_iter()
            .map(|p| Ok((self.voxel_of(&p)?, p)))
            .collect::<Result<Vec<_>, KeyRangeError>>()?;

        let mut summary = MergeSummary::default();
        for (voxel, point) in keyed {
            summary.record(self.insert_into(voxel, point));
        }

        debug!(
            inserted = summary.inserted,
            rejected_full = summary.rejected_full,
            rejected_too_close = summary.rejected_too_close,
            num_voxels = self.voxels.len(),
            num_points = self.num_points,
            "merged points into voxel map"
        );
        Ok(summary)
    }

    /// Remove every voxel for which `predicate` returns true.
    ///
    /// Returns the number of voxels removed.
    pub fn evict<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Voxel) -> bool,
    {
        let before = self.voxels.len();
        let mut removed_points = 0;
        self.voxels.retain(|voxel, block| {
            if predicate(voxel) {
                removed_points += block.len();
                false
            } else {
                true
            }
        });
        self.num_points -= removed_points;

        let removed = before - self.voxels.len();
        debug!(
            removed_voxels = removed,
            removed_points,
            remaining_voxels = self.voxels.len(),
            "evicted voxels"
        );
        removed
    }

    /// Remove voxels whose center is farther than `max_distance` from `location`.
    ///
    /// A negative or NaN `max_distance` removes nothing.
    ///
    /// # Returns
    ///
    /// The number of voxels removed.
    pub fn evict_far_from(&mut self, location: &Vector3<f64>, max_distance: f64) -> usize {
        if max_distance.is_nan() || max_distance < 0.0 {
            warn!(max_distance, "ignoring eviction with invalid distance");
            return 0;
        }
        let voxel_size = self.config.voxel_size;
        let max_distance_sq = max_distance * max_distance;
        self.evict(|voxel| (voxel.center(voxel_size) - location).norm_squared() > max_distance_sq)
    }

    /// Number of occupied voxels.
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// Whether no voxel is occupied.
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Number of stored points across all voxels.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Points stored in `voxel`, if it is occupied.
    pub fn get(&self, voxel: &Voxel) -> Option<&VoxelBlock> {
        self.voxels.get(voxel)
    }

    /// Whether `voxel` holds at least one point.
    pub fn contains(&self, voxel: &Voxel) -> bool {
        self.voxels.contains_key(voxel)
    }

    /// Iterate over occupied voxels in hash-table order.
    pub fn iter(&self) -> impl Iterator<Item = (&Voxel, &VoxelBlock)> {
        self.voxels.iter()
    }

    /// Occupied voxels in lexicographic order.
    pub fn sorted_voxels(&self) -> Vec<Voxel> {
        let mut voxels: Vec<_> = self.voxels.keys().copied().collect();
        voxels.sort_unstable();
        voxels
    }

    /// All stored points, e.g. for publishing the map as a point cloud.
    pub fn points(&self) -> impl Iterator<Item = &Vector3<f64>> {
        self.voxels.values().flat_map(|block| block.points().iter())
    }

    /// Per-axis minimum and maximum of the occupied voxels.
    pub fn bounds(&self) -> Option<(Voxel, Voxel)> {
        let mut keys = self.voxels.keys();
        let first = *keys.next()?;
        let mut min = [first.x(), first.y(), first.z()];
        let mut max = min;

        for voxel in keys {
            let coords = [voxel.x(), voxel.y(), voxel.z()];
            for axis in 0..3 {
                min[axis] = min[axis].min(coords[axis]);
                max[axis] = max[axis].max(coords[axis]);
            }
        }

        Some((
            Voxel::new(min[0], min[1], min[2]),
            Voxel::new(max[0], max[1], max[2]),
        ))
    }

    /// Remove all voxels. The configuration is kept.
    pub fn clear(&mut self) {
        self.voxels.clear();
        self.num_points = 0;
    }

    /// Occupancy summary, e.g. for periodic debug logging.
    pub fn stats(&self) -> MapStats {
        let capacity = self.config.max_points_per_voxel;
        let num_voxels = self.voxels.len();
        MapStats {
            num_voxels,
            num_points: self.num_points,
            full_voxels: self.voxels.values().filter(|b| b.len() >= capacity).count(),
            mean_occupancy: if num_voxels == 0 {
                0.0
            } else {
                self.num_points as f64 / num_voxels as f64
            },
        }
    }
}
