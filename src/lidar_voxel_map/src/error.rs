//! Error types.
//!
//! Capacity overflow and short query results are not errors; they are
//! reported through [`InsertOutcome`](crate::InsertOutcome) and the length of
//! query results.

use thiserror::Error;

/// Axis of a voxel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(name)
    }
}

/// A grid coordinate that does not fit the voxel key's 16-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum KeyRangeError {
    #[error("voxel {axis} coordinate {value} is outside [-32768, 32767]")]
    OutOfRange { axis: Axis, value: i64 },
    #[error("point {axis} coordinate {value} is not finite")]
    NonFinite { axis: Axis, value: f64 },
}

/// Invalid map configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("voxel_size must be positive and finite, got {0}")]
    VoxelSize(f64),
    #[error("max_points_per_voxel must be at least 1")]
    ZeroCapacity,
    #[error("min_distance_points must be non-negative and finite, got {0}")]
    MinDistance(f64),
}

/// Invalid trajectory or point metadata.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    #[error("{which} rotation is not orthonormal (determinant {determinant}, orthogonality error {orthogonality_error})")]
    InvalidRotation {
        which: &'static str,
        determinant: f64,
        orthogonality_error: f64,
    },
    #[error("frame index must be non-negative, got {0}")]
    NegativeFrameIndex(i32),
}

/// Any error produced by this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    KeyRange(#[from] KeyRangeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
