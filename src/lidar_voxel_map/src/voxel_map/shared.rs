//! Thread-safe wrapper for pipelines that overlap scan processing.
//!
//! Two access patterns are supported:
//!
//! - Lock-based: mutations take the write lock for their whole duration and
//!   queries run under the read lock, so a query never overlaps a mutation.
//! - Snapshot-based: [`SharedVoxelMap::snapshot`] hands out an
//!   `Arc<VoxelHashMap>` that never changes. A mutation while snapshots are
//!   alive copies the map first (copy-on-write), so the optimizer can keep
//!   querying a consistent view while the next scan is merged.

use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::RwLock;
use tracing::debug;

use super::{InsertOutcome, MergeSummary, Voxel, VoxelHashMap, VoxelMapConfig};
use crate::error::{ConfigError, KeyRangeError};
use crate::point::Point3D;

/// A [`VoxelHashMap`] that can be shared between the registration and
/// map-update threads.
#[derive(Debug, Default)]
pub struct SharedVoxelMap {
    map: RwLock<Arc<VoxelHashMap>>,
}

impl SharedVoxelMap {
    /// Create an empty shared map, failing if the configuration is invalid.
    pub fn new(config: VoxelMapConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_map(VoxelHashMap::new(config)?))
    }

    /// Wrap an existing map, e.g. one preloaded from a previous session.
    pub fn from_map(map: VoxelHashMap) -> Self {
        Self {
            map: RwLock::new(Arc::new(map)),
        }
    }

    /// Current state of the map. Later mutations are not visible through it.
    pub fn snapshot(&self) -> Arc<VoxelHashMap> {
        Arc::clone(&self.map.read())
    }

    /// Run `f` with shared access; blocks while a mutation is in progress.
    pub fn read<R>(&self, f: impl FnOnce(&VoxelHashMap) -> R) -> R {
        let guard = self.map.read();
        f(&guard)
    }

    /// Run `f` with exclusive access, copying the map if snapshots are alive.
    pub fn write<R>(&self, f: impl FnOnce(&mut VoxelHashMap) -> R) -> R {
        let mut guard = self.map.write();
        let snapshots = Arc::strong_count(&guard) - 1;
        if snapshots > 0 {
            debug!(
                snapshots,
                num_points = guard.num_points(),
                "copying voxel map for outstanding snapshots"
            );
        }
        f(Arc::make_mut(&mut guard))
    }

    /// [`VoxelHashMap::insert`] under the write lock.
    pub fn insert(&self, point: &Vector3<f64>) -> Result<InsertOutcome, KeyRangeError> {
        self.write(|map| map.insert(point))
    }

    /// [`VoxelHashMap::merge`] under the write lock.
    pub fn merge(&self, points: &[Point3D]) -> Result<MergeSummary, KeyRangeError> {
        self.write(|map| map.merge(points))
    }

    pub fn evict<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&Voxel) -> bool,
    {
        self.write(|map| map.evict(predicate))
    }

    pub fn evict_far_from(&self, location: &Vector3<f64>, max_distance: f64) -> usize {
        self.write(|map| map.evict_far_from(location, max_distance))
    }

    /// [`VoxelHashMap::query_nearest`] under the read lock.
    pub fn query_nearest(
        &self,
        query: &Vector3<f64>,
        k: usize,
    ) -> Result<Vec<Vector3<f64>>, KeyRangeError> {
        self.read(|map| map.query_nearest(query, k))
    }
}
