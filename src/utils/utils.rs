//! Helper functions

use crate::kinematic_traits::{Joints, Pose};

/// Checks if all elements are finite
pub fn is_valid(values: &[f64]) -> bool {
    values.iter().all(|&q| q.is_finite())
}

/// Print joint values, converting radians to degrees.
#[allow(dead_code)]
pub fn dump_joints(joints: &Joints) {
    let mut row_str = String::new();
    for joint in joints.iter() {
        row_str.push_str(&format!("{:5.2} ", joint.to_degrees()));
    }
    println!("[{}]", row_str.trim_end());
}

pub fn dump_pose(pose: &Pose) {
    println!(
        "x: {:.5}, y: {:.5}, z: {:.5},  axis-angle: {:.5},{:.5},{:.5}",
        pose[0], pose[1], pose[2], pose[3], pose[4], pose[5]
    );
}

/// Compact single line pose representation for logs
pub fn format_pose(pose: &Pose) -> String {
    format!(
        "[{:.4}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}]",
        pose[0], pose[1], pose[2], pose[3], pose[4], pose[5]
    )
}

/// formatting for YAML output
pub(crate) fn deg(x: &f64) -> String {
    if *x == 0.0 {
        return "0".to_string();
    }
    format!("deg({:.4})", x.to_degrees())
}

/// Panics if the poses differ by more than the tolerance in translation (first three components)
/// or in the axis-angle components (last three).
pub fn assert_pose_eq(pa: &Pose, pb: &Pose, distance_tolerance: f64, angular_tolerance: f64) -> bool {
    fn bad(pa: &Pose, pb: &Pose) {
        dump_pose(pa);
        dump_pose(pb);
    }

    let translation_distance = (pa.fixed_rows::<3>(0) - pb.fixed_rows::<3>(0)).norm();
    let angular_distance = (pa.fixed_rows::<3>(3) - pb.fixed_rows::<3>(3)).norm();

    if translation_distance > distance_tolerance {
        bad(pa, pb);
        panic!("Poses have too different translations");
    }

    if angular_distance > angular_tolerance {
        bad(pa, pb);
        panic!("Poses have too different angles");
    }
    true
}
