//! Voxel keys and the spatial hash used to bucket them.
//!
//! A [`Voxel`] is a cell of a regular grid with edge length `voxel_size`.
//! Coordinates are stored as `i16`, which limits the map extent to
//! `65536 * voxel_size` per axis. Anything outside that range is rejected
//! with [`KeyRangeError`] instead of wrapping into a distant cell.

use std::hash::{BuildHasherDefault, Hash, Hasher};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Axis, KeyRangeError};

/// Hash multiplier for the x coordinate.
pub const HASH_P1: u64 = 73_856_093;
/// Hash multiplier for the y coordinate.
pub const HASH_P2: u64 = 19_349_669;
/// Hash multiplier for the z coordinate.
pub const HASH_P3: u64 = 83_492_791;

/// Integer grid coordinates of a map cell.
///
/// Ordering is lexicographic on `(x, y, z)` and only used where a
/// deterministic order is needed; bucket placement uses [`Voxel::spatial_hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Voxel {
    x: i16,
    y: i16,
    z: i16,
}

impl Voxel {
    /// Create a voxel from grid coordinates.
    ///
    /// Every `i16` triple is a valid key; use [`Voxel::try_new`] or
    /// [`Voxel::from_point`] when the input may be out of range.
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Build a voxel from wide integer coordinates, rejecting values that do
    /// not fit the 16-bit key.
    pub fn try_new(x: i64, y: i64, z: i64) -> Result<Self, KeyRangeError> {
        Ok(Self {
            x: narrow(Axis::X, x)?,
            y: narrow(Axis::Y, y)?,
            z: narrow(Axis::Z, z)?,
        })
    }

    /// Compute the voxel containing `point` via per-axis `floor(p / voxel_size)`.
    ///
    /// `voxel_size` is assumed positive; the map validates it at construction.
    ///
    /// # Arguments
    /// * `point` - Map-frame coordinate in meters
    /// * `voxel_size` - Voxel side length in meters
    ///
    /// # Errors
    /// [`KeyRangeError`] if a coordinate is non-finite or its cell index does
    /// not fit in an `i16`.
    pub fn from_point(point: &Vector3<f64>, voxel_size: f64) -> Result<Self, KeyRangeError> {
        Ok(Self {
            x: cell(Axis::X, point.x, voxel_size)?,
            y: cell(Axis::Y, point.y, voxel_size)?,
            z: cell(Axis::Z, point.z, voxel_size)?,
        })
    }

    /// Grid coordinate along x.
    pub fn x(&self) -> i16 {
        self.x
    }

    /// Grid coordinate along y.
    pub fn y(&self) -> i16 {
        self.y
    }

    /// Grid coordinate along z.
    pub fn z(&self) -> i16 {
        self.z
    }

    /// Prime-multiplication spatial hash (Teschner et al.).
    ///
    /// Each coordinate is sign-extended to 64 bits and the products wrap, so
    /// negative cells hash to the same values as the classic `size_t`
    /// formulation.
    pub fn spatial_hash(&self) -> u64 {
        let x = i64::from(self.x) as u64;
        let y = i64::from(self.y) as u64;
        let z = i64::from(self.z) as u64;
        x.wrapping_mul(HASH_P1)
            .wrapping_add(y.wrapping_mul(HASH_P2))
            .wrapping_add(z.wrapping_mul(HASH_P3))
    }

    /// World-space center of this cell.
    pub fn center(&self, voxel_size: f64) -> Vector3<f64> {
        Vector3::new(
            (f64::from(self.x) + 0.5) * voxel_size,
            (f64::from(self.y) + 0.5) * voxel_size,
            (f64::from(self.z) + 0.5) * voxel_size,
        )
    }

    /// Largest per-axis coordinate difference.
    pub fn chebyshev_distance(&self, other: &Voxel) -> u32 {
        let dx = (i32::from(self.x) - i32::from(other.x)).unsigned_abs();
        let dy = (i32::from(self.y) - i32::from(other.y)).unsigned_abs();
        let dz = (i32::from(self.z) - i32::from(other.z)).unsigned_abs();
        dx.max(dy).max(dz)
    }

    /// All voxels within Chebyshev distance `radius`, in lexicographic order.
    ///
    /// Cells that would fall outside the 16-bit range are skipped, so near the
    /// edge of the representable extent the cube is truncated.
    pub fn neighborhood(&self, radius: u32) -> impl Iterator<Item = Voxel> {
        let (x_lo, x_hi) = axis_span(self.x, radius);
        let (y_lo, y_hi) = axis_span(self.y, radius);
        let (z_lo, z_hi) = axis_span(self.z, radius);

        (x_lo..=x_hi).flat_map(move |x| {
            (y_lo..=y_hi).flat_map(move |y| (z_lo..=z_hi).map(move |z| Voxel::new(x, y, z)))
        })
    }
}

impl Hash for Voxel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.spatial_hash());
    }
}

impl std::fmt::Display for Voxel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<(i16, i16, i16)> for Voxel {
    fn from((x, y, z): (i16, i16, i16)) -> Self {
        Self::new(x, y, z)
    }
}

/// Multiplier used to spread the spatial hash over all 64 bits.
const FINISH_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Hasher fed by the voxel's spatial hash.
///
/// The prime hash of non-negative cells stays below `2^43`, so its top bits
/// are constant. hashbrown takes its control tag from those bits, so
/// [`finish`](Hasher::finish) multiplies and rotates the value to give every
/// bit a share of the input. Bucket assignment is still a pure function of
/// [`Voxel::spatial_hash`].
///
/// Only `write_u64` is expected; arbitrary byte input is folded so the
/// hasher stays usable with other key types.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoxelHasher(u64);

impl VoxelHasher {
    /// Final 64-bit value produced for a given spatial hash.
    pub const fn mix(hash: u64) -> u64 {
        hash.wrapping_mul(FINISH_MIX).rotate_left(26)
    }
}

impl Hasher for VoxelHasher {
    fn finish(&self) -> u64 {
        Self::mix(self.0)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(u64::from(byte));
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

/// `BuildHasher` for maps keyed by [`Voxel`].
pub type VoxelBuildHasher = BuildHasherDefault<VoxelHasher>;

fn narrow(axis: Axis, value: i64) -> Result<i16, KeyRangeError> {
    i16::try_from(value).map_err(|_| KeyRangeError::OutOfRange { axis, value })
}

fn cell(axis: Axis, value: f64, voxel_size: f64) -> Result<i16, KeyRangeError> {
    if !value.is_finite() {
        return Err(KeyRangeError::NonFinite { axis, value });
    }
    let index = (value / voxel_size).floor();
    if !(f64::from(i16::MIN)..=f64::from(i16::MAX)).contains(&index) {
        // Saturating cast; only used for the error message.
        return Err(KeyRangeError::OutOfRange {
            axis,
            value: index as i64,
        });
    }
    Ok(index as i16)
}

fn axis_span(center: i16, radius: u32) -> (i16, i16) {
    let center = i64::from(center);
    let radius = i64::from(radius);
    let lo = (center - radius).max(i64::from(i16::MIN));
    let hi = (center + radius).min(i64::from(i16::MAX));
    (lo as i16, hi as i16)
}
