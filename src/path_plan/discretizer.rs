//! Turns a sparse sequence of target poses into dense waypoints.
//!
//! Interpolation blends each of the 6 pose components linearly, the axis-angle
//! components included. This is not a spherical interpolation of orientation and is
//! only accurate while the orientation changes little between consecutive poses.
//! Paths with large rotations between targets must be densified by the caller first.

use crate::control_error::ControlError;
use crate::geometry::{pose_to_transform, transform_to_pose};
use crate::kinematic_traits::{Pose, Transform};

/// `count` poses starting at `start` (inclusive) and advancing towards `end` by
/// `(end - start) / count`. The `end` pose itself is not included, it is the first
/// waypoint of the next segment.
pub fn create_waypoints(start: &Pose, end: &Pose, count: usize) -> Vec<Pose> {
    if count == 0 {
        return Vec::new();
    }
    let step = (end - start) / count as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Discretize the path so that every segment between two consecutive `poses` gets
/// `resolution / (poses.len() - 1)` waypoints (integer division, the remainder is dropped).
/// The result has exactly `(k - 1) * (resolution / (k - 1))` waypoints for `k` poses.
pub fn discretize(poses: &[Pose], resolution: usize) -> Result<Vec<Pose>, ControlError> {
    if poses.len() < 2 {
        return Err(ControlError::InsufficientWaypoints { found: poses.len() });
    }
    let per_segment = resolution / (poses.len() - 1);
    let mut waypoints = Vec::with_capacity(per_segment * (poses.len() - 1));
    for segment in poses.windows(2) {
        waypoints.extend(create_waypoints(&segment[0], &segment[1], per_segment));
    }
    Ok(waypoints)
}

/// Convert the path given as transforms into poses
pub fn poses_from_transforms(transforms: &[Transform]) -> Vec<Pose> {
    transforms.iter().map(transform_to_pose).collect()
}

/// Apply the static `offset` to every pose (post-multiplied in the pose frame). This moves
/// a path planned for one link (e.g. the gripper) to another link rigidly attached to it.
pub fn retarget(poses: &[Pose], offset: &Transform) -> Vec<Pose> {
    poses
        .iter()
        .map(|pose| transform_to_pose(&(pose_to_transform(pose) * offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Vector3};

    #[test]
    fn test_create_waypoints() {
        let start = Pose::zeros();
        let end = Pose::new(1.0, 0.0, -1.0, 0.0, 0.0, 0.4);
        let points = create_waypoints(&start, &end, 4);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], start);
        assert!((points[1][0] - 0.25).abs() < 1e-12);
        assert!((points[3][2] + 0.75).abs() < 1e-12);
        assert!((points[2][5] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_discretize_count() {
        let poses: Vec<Pose> = (0..4).map(|i| Pose::new(i as f64, 0.0, 0.0, 0.0, 0.0, 0.0)).collect();
        for resolution in [0, 2, 3, 10, 500] {
            let waypoints = discretize(&poses, resolution).unwrap();
            assert_eq!(waypoints.len(), 3 * (resolution / 3), "resolution {}", resolution);
        }
    }

    #[test]
    fn test_discretize_is_monotonic() {
        let poses = vec![Pose::zeros(), Pose::new(1.0, 2.0, 0.0, 0.0, 0.0, 0.0), Pose::new(2.0, 0.0, 0.0, 0.0, 0.0, 0.0)];
        let waypoints = discretize(&poses, 10).unwrap();
        assert_eq!(waypoints.len(), 10);
        for pair in waypoints.windows(2) {
            assert!(pair[1][0] > pair[0][0]);
        }
        // Second segment starts exactly at the middle pose
        assert_eq!(waypoints[5], poses[1]);
    }

    #[test]
    fn test_discretize_needs_two_poses() {
        assert!(matches!(discretize(&[], 10), Err(ControlError::InsufficientWaypoints { found: 0 })));
        assert!(matches!(
            discretize(&[Pose::zeros()], 10),
            Err(ControlError::InsufficientWaypoints { found: 1 })
        ));
    }

    #[test]
    fn test_retarget() {
        let poses = vec![Pose::new(1.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2)];
        let offset = Isometry3::translation(0.5, 0.0, 0.0);
        let moved = retarget(&poses, &offset);
        // Offset along local x, which is world y after the 90 degree yaw
        assert!((moved[0][0] - 1.0).abs() < 1e-12);
        assert!((moved[0][1] - 0.5).abs() < 1e-12);
        assert!((moved[0][5] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_poses_from_transforms() {
        let transforms = vec![Isometry3::new(Vector3::new(0.1, 0.2, 0.3), Vector3::zeros())];
        let poses = poses_from_transforms(&transforms);
        assert_eq!(poses, vec![Pose::new(0.1, 0.2, 0.3, 0.0, 0.0, 0.0)]);
    }
}
