//! Scan point with motion-correction state.

use nalgebra::Vector3;

use crate::error::{KeyRangeError, TrajectoryError};
use crate::voxel_map::Voxel;

/// Frame index of a point that has not been assigned to a scan yet.
pub const UNASSIGNED_FRAME: i32 = -1;

/// One LiDAR return within one scan.
///
/// `pt` starts equal to `raw_pt` and is overwritten once motion compensation
/// has run. `alpha_timestamp` is always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    raw_pt: Vector3<f64>,
    pt: Vector3<f64>,
    alpha_timestamp: f64,
    index_frame: i32,
}

impl Default for Point3D {
    fn default() -> Self {
        Self {
            raw_pt: Vector3::zeros(),
            pt: Vector3::zeros(),
            alpha_timestamp: 0.0,
            index_frame: UNASSIGNED_FRAME,
        }
    }
}

impl Point3D {
    /// Create a point as measured by the sensor; `pt` is set to `raw_pt`.
    pub fn from_raw(raw_pt: Vector3<f64>, alpha_timestamp: f64) -> Self {
        Self {
            raw_pt,
            pt: raw_pt,
            alpha_timestamp: clamp_alpha(alpha_timestamp),
            index_frame: UNASSIGNED_FRAME,
        }
    }

    /// Set the originating frame while building a point.
    pub fn with_frame(mut self, index_frame: i32) -> Result<Self, TrajectoryError> {
        self.set_index_frame(index_frame)?;
        Ok(self)
    }

    /// Sensor-frame coordinate as measured.
    pub fn raw_pt(&self) -> &Vector3<f64> {
        &self.raw_pt
    }

    /// Map-frame coordinate after motion compensation.
    pub fn pt(&self) -> &Vector3<f64> {
        &self.pt
    }

    pub fn set_pt(&mut self, pt: Vector3<f64>) {
        self.pt = pt;
    }

    /// Normalized acquisition time within the scan (0 = start, 1 = end).
    pub fn alpha_timestamp(&self) -> f64 {
        self.alpha_timestamp
    }

    /// Clamped to `[0, 1]`; NaN becomes `0`.
    pub fn set_alpha_timestamp(&mut self, alpha_timestamp: f64) {
        self.alpha_timestamp = clamp_alpha(alpha_timestamp);
    }

    /// Originating scan, or [`UNASSIGNED_FRAME`].
    pub fn index_frame(&self) -> i32 {
        self.index_frame
    }

    pub fn is_frame_assigned(&self) -> bool {
        self.index_frame >= 0
    }

    pub fn set_index_frame(&mut self, index_frame: i32) -> Result<(), TrajectoryError> {
        if index_frame < 0 {
            return Err(TrajectoryError::NegativeFrameIndex(index_frame));
        }
        self.index_frame = index_frame;
        Ok(())
    }

    /// Voxel containing the map-frame coordinate.
    pub fn voxel(&self, voxel_size: f64) -> Result<Voxel, KeyRangeError> {
        Voxel::from_point(&self.pt, voxel_size)
    }
}

fn clamp_alpha(alpha: f64) -> f64 {
    if alpha.is_nan() {
        0.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}
