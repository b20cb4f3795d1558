//! Conversion between rigid transforms and compact 6-vector poses
//! (translation + axis-angle), and frame relationships between links.
//!
//! The axis-angle part is the rotation axis scaled by the rotation angle, with the
//! angle in `[0, pi]`. A rotation by exactly 180 degrees has two equivalent axis
//! directions; [transform_to_pose] returns one of them without reporting an error.
//! Converting such a pose back still produces the original rotation, but the pose
//! itself is not unique and must not be compared component-wise.

extern crate nalgebra as na;
use na::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use std::f64::consts::PI;
use tracing::debug;

use crate::control_error::ControlError;
use crate::kinematic_traits::{KinematicModel, Pose, Transform};

/// Rotations closer than this to 180 degrees are considered half turns.
const HALF_TURN_TOLERANCE: f64 = 1e-6;

/// Convert a transform into `[x, y, z, rx, ry, rz]`.
pub fn transform_to_pose(transform: &Transform) -> Pose {
    let translation = transform.translation.vector;
    if is_half_turn(transform) {
        debug!("Half turn rotation, axis-angle direction is ambiguous");
    }
    let angles = transform.rotation.scaled_axis();
    Pose::new(
        translation.x, translation.y, translation.z,
        angles.x, angles.y, angles.z,
    )
}

/// Convert `[x, y, z, rx, ry, rz]` into a transform.
pub fn pose_to_transform(pose: &Pose) -> Transform {
    Isometry3::new(
        Vector3::new(pose[0], pose[1], pose[2]),
        Vector3::new(pose[3], pose[4], pose[5]),
    )
}

/// Build the transform from a 4x4 homogeneous matrix. The upper left 3x3 block
/// must be a proper rotation matrix; it is not orthonormalized.
pub fn transform_from_matrix(matrix: &Matrix4<f64>) -> Transform {
    let rotation: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = Rotation3::from_matrix_unchecked(rotation);
    let translation = Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    Isometry3::from_parts(translation, UnitQuaternion::from_rotation_matrix(&rotation))
}

/// Transform of the frame `link_a` relative to the frame `link_b`, both given in a
/// common reference frame: `inverse(link_b) * link_a`.
pub fn relative_transform(link_a: &Transform, link_b: &Transform) -> Transform {
    link_b.inverse() * link_a
}

/// Transform of the link named `link_a` relative to the link named `link_b`, taking
/// both from the current state of the kinematic model.
pub fn transform_between_links(
    model: &impl KinematicModel,
    link_a: &str,
    link_b: &str,
) -> Result<Transform, ControlError> {
    let a = model
        .link_transform(link_a)
        .ok_or_else(|| ControlError::UnknownLink(link_a.to_string()))?;
    let b = model
        .link_transform(link_b)
        .ok_or_else(|| ControlError::UnknownLink(link_b.to_string()))?;
    Ok(relative_transform(&a, &b))
}

/// True if the rotation of the transform is (numerically) a rotation by 180 degrees.
pub fn is_half_turn(transform: &Transform) -> bool {
    transform.rotation.angle() > PI - HALF_TURN_TOLERANCE
}

/// Planar yaw of the transform (rotation around the world z axis).
pub fn yaw(transform: &Transform) -> f64 {
    let (_, _, yaw) = transform.rotation.euler_angles();
    yaw
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_transform_eq(a: &Transform, b: &Transform, rotation_tol: f64, translation_tol: f64) {
        let ma = a.to_homogeneous();
        let mb = b.to_homogeneous();
        for i in 0..3 {
            for j in 0..3 {
                assert!((ma[(i, j)] - mb[(i, j)]).abs() < rotation_tol,
                        "rotation [{},{}]: {} vs {}", i, j, ma[(i, j)], mb[(i, j)]);
            }
            assert!((ma[(i, 3)] - mb[(i, 3)]).abs() < translation_tol,
                    "translation [{}]: {} vs {}", i, ma[(i, 3)], mb[(i, 3)]);
        }
    }

    #[test]
    fn test_identity_is_zero_pose() {
        let pose = transform_to_pose(&Transform::identity());
        assert_eq!(pose, Pose::zeros());
    }

    #[test]
    fn test_pose_components() {
        let transform = Isometry3::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 0.0, FRAC_PI_2));
        let pose = transform_to_pose(&transform);
        assert!((pose[0] - 1.0).abs() < 1e-12);
        assert!((pose[2] - 3.0).abs() < 1e-12);
        assert!(pose[3].abs() < 1e-12);
        assert!((pose[5] - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let transform = Isometry3::new(Vector3::new(0.3, -0.2, 0.9), Vector3::new(0.4, -1.1, 0.7));
        let restored = pose_to_transform(&transform_to_pose(&transform));
        assert_transform_eq(&transform, &restored, 1e-9, 1e-12);
    }

    #[test]
    fn test_half_turn_reconstructs_rotation() {
        let transform = Isometry3::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, PI, 0.0));
        assert!(is_half_turn(&transform));
        let pose = transform_to_pose(&transform);
        assert!(((pose[3] * pose[3] + pose[4] * pose[4] + pose[5] * pose[5]).sqrt() - PI).abs() < 1e-9);
        let restored = pose_to_transform(&pose);
        assert_transform_eq(&transform, &restored, 1e-9, 1e-12);
    }

    #[test]
    fn test_homogeneous_matrix() {
        let transform = Isometry3::new(Vector3::new(0.5, 0.25, -1.0), Vector3::new(0.2, 0.3, -0.4));
        let restored = transform_from_matrix(&transform.to_homogeneous());
        assert_transform_eq(&transform, &restored, 1e-12, 1e-12);
    }

    #[test]
    fn test_relative_transform() {
        let wrist = Isometry3::new(Vector3::new(1.0, 0.0, 0.5), Vector3::new(0.0, 0.0, FRAC_PI_2));
        let gripper = wrist * Isometry3::translation(0.2, 0.0, 0.0);
        // Gripper relative to wrist is the fixed offset
        let offset = relative_transform(&gripper, &wrist);
        assert_transform_eq(&offset, &Isometry3::translation(0.2, 0.0, 0.0), 1e-12, 1e-12);
        // Composing back gives the gripper
        assert_transform_eq(&(wrist * offset), &gripper, 1e-12, 1e-12);
    }

    #[test]
    fn test_yaw() {
        let transform = Isometry3::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -0.7));
        assert!((yaw(&transform) + 0.7).abs() < 1e-12);
    }
}
