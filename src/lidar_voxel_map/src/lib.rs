//! Voxel hash map for LiDAR scan-to-map registration.
//!
//! This library provides the map-side data model of a LiDAR odometry
//! pipeline: scan points carrying motion-correction state, the pose segment of
//! each scan, and a spatially hashed voxel map used to find nearest neighbors
//! in the accumulated point cloud.
//!
//! # Architecture
//!
//! - [`Voxel`]: 16-bit integer grid key with the prime-multiplication spatial hash
//! - [`Point3D`]: raw and map-frame coordinate, intra-scan timestamp, frame index
//! - [`TrajectoryFrame`]: begin/end rotation and translation of one scan
//! - [`VoxelHashMap`]: capacity-bounded voxel buckets with neighbor queries,
//!   eviction and batch merge
//! - [`SharedVoxelMap`]: lock and snapshot access for overlapping pipelines
//!
//! # Usage
//!
//! ```
//! use lidar_voxel_map::{Point3D, TrajectoryFrame, VoxelHashMap, VoxelMapConfig};
//! use nalgebra::Vector3;
//!
//! let mut map = VoxelHashMap::new(VoxelMapConfig::with_voxel_size(0.5))?;
//!
//! // Points arrive with `pt` already motion-compensated
//! let scan: Vec<Point3D> = (0..10)
//!     .map(|i| Point3D::from_raw(Vector3::new(i as f64 * 0.3, 1.0, 0.2), i as f64 / 9.0))
//!     .collect();
//! let summary = map.merge(&scan)?;
//! assert_eq!(summary.inserted, 10);
//!
//! // Correspondences for the next scan
//! let neighbors = map.query_nearest(&Vector3::new(1.0, 1.0, 0.2), 3)?;
//! assert_eq!(neighbors.len(), 3);
//!
//! // Drop voxels far from the latest sensor position
//! let frame = TrajectoryFrame::default();
//! map.evict_far_from(frame.end_t(), 100.0);
//! # Ok::<(), lidar_voxel_map::Error>(())
//! ```

pub mod error;
pub mod point;
pub mod test_utils;
pub mod trajectory;
pub mod voxel_map;

pub use error::{Axis, ConfigError, Error, KeyRangeError, Result, TrajectoryError};
pub use point::{Point3D, UNASSIGNED_FRAME};
pub use trajectory::TrajectoryFrame;
pub use voxel_map::{
    InsertOutcome, MapStats, MergeSummary, SharedVoxelMap, Voxel, VoxelBlock, VoxelBuildHasher,
    VoxelHashMap, VoxelMapBuilder, VoxelMapConfig,
};
