//! Rigid-pose segment covering one scan's acquisition window.
//!
//! A [`TrajectoryFrame`] holds the sensor pose at the start and end of a
//! scan. Motion compensation interpolates between the two for each point's
//! `alpha_timestamp`; that step lives outside this crate.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::error::TrajectoryError;

/// Tolerance for accepting a raw matrix as a rotation.
pub const ROTATION_TOLERANCE: f64 = 1e-6;

/// Begin and end pose of one scan.
///
/// Rotations are stored as [`Rotation3`], so they are orthonormal with
/// determinant +1 whenever a frame is observable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryFrame {
    begin_r: Rotation3<f64>,
    begin_t: Vector3<f64>,
    end_r: Rotation3<f64>,
    end_t: Vector3<f64>,
}

impl Default for TrajectoryFrame {
    fn default() -> Self {
        Self {
            begin_r: Rotation3::identity(),
            begin_t: Vector3::zeros(),
            end_r: Rotation3::identity(),
            end_t: Vector3::zeros(),
        }
    }
}

impl TrajectoryFrame {
    pub fn new(
        begin_r: Rotation3<f64>,
        begin_t: Vector3<f64>,
        end_r: Rotation3<f64>,
        end_t: Vector3<f64>,
    ) -> Self {
        Self {
            begin_r,
            begin_t,
            end_r,
            end_t,
        }
    }

    /// Build a frame from raw 3x3 matrices, checking both are rotations.
    pub fn from_matrices(
        begin_r: Matrix3<f64>,
        begin_t: Vector3<f64>,
        end_r: Matrix3<f64>,
        end_t: Vector3<f64>,
    ) -> Result<Self, TrajectoryError> {
        Ok(Self {
            begin_r: checked_rotation("begin", begin_r)?,
            begin_t,
            end_r: checked_rotation("end", end_r)?,
            end_t,
        })
    }

    /// Frame with the same pose at both ends.
    pub fn stationary(pose: &Isometry3<f64>) -> Self {
        let r = pose.rotation.to_rotation_matrix();
        let t = pose.translation.vector;
        Self::new(r, t, r, t)
    }

    pub fn begin_r(&self) -> &Rotation3<f64> {
        &self.begin_r
    }

    pub fn begin_t(&self) -> &Vector3<f64> {
        &self.begin_t
    }

    pub fn end_r(&self) -> &Rotation3<f64> {
        &self.end_r
    }

    pub fn end_t(&self) -> &Vector3<f64> {
        &self.end_t
    }

    pub fn begin_pose(&self) -> Isometry3<f64> {
        to_isometry(&self.begin_r, &self.begin_t)
    }

    pub fn end_pose(&self) -> Isometry3<f64> {
        to_isometry(&self.end_r, &self.end_t)
    }

    /// Midpoint of the begin and end translations.
    pub fn mid_translation(&self) -> Vector3<f64> {
        (self.begin_t + self.end_t) * 0.5
    }

    /// Translation covered during the scan (`end_t - begin_t`).
    pub fn translation_delta(&self) -> Vector3<f64> {
        self.end_t - self.begin_t
    }
}

fn to_isometry(r: &Rotation3<f64>, t: &Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::from(*t),
        UnitQuaternion::from_rotation_matrix(r),
    )
}

fn checked_rotation(
    which: &'static str,
    m: Matrix3<f64>,
) -> Result<Rotation3<f64>, TrajectoryError> {
    let determinant = m.determinant();
    let orthogonality_error = (m.transpose() * m - Matrix3::identity()).norm();

    let valid = determinant.is_finite()
        && (determinant - 1.0).abs() <= ROTATION_TOLERANCE
        && orthogonality_error <= ROTATION_TOLERANCE;
    if !valid {
        return Err(TrajectoryError::InvalidRotation {
            which,
            determinant,
            orthogonality_error,
        });
    }
    Ok(Rotation3::from_matrix_unchecked(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_default_is_identity() {
        let frame = TrajectoryFrame::default();
        assert_relative_eq!(frame.begin_pose(), Isometry3::identity());
        assert_relative_eq!(frame.end_pose(), Isometry3::identity());
        assert_eq!(frame.translation_delta(), Vector3::zeros());
    }

    #[test]
    fn test_from_matrices_accepts_rotations() {
        let r = Rotation3::from_euler_angles(0.1, -0.2, 0.3);
        let frame = TrajectoryFrame::from_matrices(
            *r.matrix(),
            Vector3::new(1.0, 2.0, 3.0),
            Matrix3::identity(),
            Vector3::new(2.0, 2.0, 3.0),
        )
        .unwrap();

        assert_relative_eq!(*frame.begin_r().matrix(), *r.matrix(), epsilon = 1e-12);
        assert_eq!(frame.translation_delta(), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(frame.mid_translation(), Vector3::new(1.5, 2.0, 3.0));
    }

    #[test]
    fn test_from_matrices_rejects_reflection() {
        let reflection = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        let err = TrajectoryFrame::from_matrices(
            Matrix3::identity(),
            Vector3::zeros(),
            reflection,
            Vector3::zeros(),
        )
        .unwrap_err();

        match err {
            TrajectoryError::InvalidRotation {
                which, determinant, ..
            } => {
                assert_eq!(which, "end");
                assert_relative_eq!(determinant, -1.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_matrices_rejects_scaled_matrix() {
        let scaled = Matrix3::identity() * 1.01;
        assert!(TrajectoryFrame::from_matrices(
            scaled,
            Vector3::zeros(),
            Matrix3::identity(),
            Vector3::zeros()
        )
        .is_err());

        let nan = Matrix3::from_element(f64::NAN);
        assert!(TrajectoryFrame::from_matrices(
            Matrix3::identity(),
            Vector3::zeros(),
            nan,
            Vector3::zeros()
        )
        .is_err());
    }

    #[test]
    fn test_poses() {
        let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let frame = TrajectoryFrame::new(
            Rotation3::identity(),
            Vector3::zeros(),
            yaw,
            Vector3::new(0.0, 0.0, 1.0),
        );

        let moved = frame.end_pose() * nalgebra::Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(moved.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(moved.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(moved.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stationary() {
        let pose = Isometry3::new(Vector3::new(4.0, 5.0, 6.0), Vector3::new(0.0, 0.0, 0.4));
        let frame = TrajectoryFrame::stationary(&pose);
        assert_eq!(frame.begin_t(), frame.end_t());
        assert_eq!(frame.begin_r(), frame.end_r());
        assert_relative_eq!(frame.end_pose(), pose, epsilon = 1e-9);
    }
}
