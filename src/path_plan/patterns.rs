//! Deterministic pose sequences for demonstrations and tests.

use crate::kinematic_traits::Pose;

/// One zig-zag half: `length` poses, each advancing diagonally from the previous one by
/// `sqrt(length) / 10000` in x. The first `length / 2` steps also advance in +y,
/// the rest in -y. The start pose itself is not included.
pub fn zigzag_half(start: &Pose, length: usize) -> Vec<Pose> {
    let step = (length as f64).sqrt() / 10000.0;
    let rising = Pose::new(step, step, 0.0, 0.0, 0.0, 0.0);
    let falling = Pose::new(step, -step, 0.0, 0.0, 0.0, 0.0);

    let mut poses = Vec::with_capacity(length);
    let mut current = *start;
    for i in 0..length {
        current += if i < length / 2 { rising } else { falling };
        poses.push(current);
    }
    poses
}

/// `repeats` zig-zag halves chained one after another, each starting from the last pose
/// of the previous one. At least one half is always produced.
pub fn zigzag_pattern(start: &Pose, length: usize, repeats: usize) -> Vec<Pose> {
    let mut poses = zigzag_half(start, length);
    for _ in 1..repeats {
        let Some(last) = poses.last().copied() else {
            break;
        };
        poses.extend(zigzag_half(&last, length));
    }
    poses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag_half() {
        let poses = zigzag_half(&Pose::zeros(), 10);
        assert_eq!(poses.len(), 10);
        let mut previous = Pose::zeros();
        for (i, pose) in poses.iter().enumerate() {
            assert!(pose[0] > previous[0], "x must increase at {}", i);
            if i < 5 {
                assert!(pose[1] > previous[1], "y must increase at {}", i);
            } else {
                assert!(pose[1] < previous[1], "y must decrease at {}", i);
            }
            assert_eq!(pose[2], 0.0);
            previous = *pose;
        }
        // Symmetric: ends back at y = 0
        assert!(poses[9][1].abs() < 1e-15);
    }

    #[test]
    fn test_zigzag_step_size() {
        let poses = zigzag_half(&Pose::zeros(), 100);
        assert!((poses[0][0] - 0.001).abs() < 1e-15);
        assert!((poses[0][1] - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_zigzag_pattern() {
        let start = Pose::new(0.5, 0.0, 0.8, 0.0, 1.0, 0.0);
        let poses = zigzag_pattern(&start, 200, 4);
        assert_eq!(poses.len(), 800);
        // Each half continues from the previous one
        let step = 200f64.sqrt() / 10000.0;
        assert!((poses[200][0] - poses[199][0] - step).abs() < 1e-12);
        // Orientation is carried along unchanged
        assert!(poses.iter().all(|p| p[4] == 1.0));
        assert_eq!(zigzag_pattern(&start, 6, 0).len(), 6);
    }

    #[test]
    fn test_zigzag_deterministic() {
        let a = zigzag_pattern(&Pose::zeros(), 7, 3);
        let b = zigzag_pattern(&Pose::zeros(), 7, 3);
        assert_eq!(a, b);
    }
}
