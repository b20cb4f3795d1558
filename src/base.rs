//! Maps the 2 base DOF of the solver output to a planar motion of the base frame, and
//! plans simple base motions (rotate in place, then drive straight).

extern crate nalgebra as na;
use na::{Isometry3, Vector2, Vector3};
use std::f64::consts::PI;

use crate::control_error::ControlError;
use crate::geometry::{relative_transform, transform_to_pose, yaw};
use crate::jacobian::base_jacobian;
use crate::kinematic_traits::Transform;
use crate::parameters::DriveParameters;

/// Planar base motion for one step, expressed in the base frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseGoal {
    /// Forward displacement
    pub forward: f64,

    /// Yaw change (radians)
    pub yaw: f64,

    /// The base transform after the motion, in the same frame as the current base transform
    pub goal: Transform,
}

impl BaseGoal {
    /// `[forward, lateral, yaw]`, where lateral is always zero for a differential drive.
    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.forward, 0.0, self.yaw)
    }
}

/// Maps base velocities to base displacement through the differential drive Jacobian.
#[derive(Debug, Clone, Copy)]
pub struct BaseMapper {
    pub drive: DriveParameters,
}

impl BaseMapper {
    pub fn new(drive: DriveParameters) -> Self {
        BaseMapper { drive }
    }

    /// Maps the 2 base DOF (already multiplied by the step duration) to the planar twist,
    /// composes it onto the `base` transform as a rotation followed by the forward
    /// translation, and returns the resulting motion relative to the current base frame.
    pub fn goal_cartesian(&self, q_dot_base: &Vector2<f64>, base: &Transform) -> BaseGoal {
        let twist = base_jacobian(&self.drive) * q_dot_base;
        let step = Isometry3::new(
            Vector3::new(twist[0], 0.0, 0.0),
            Vector3::new(0.0, 0.0, twist[5]),
        );
        let goal = base * step;
        let relative = transform_to_pose(&relative_transform(&goal, base));
        BaseGoal {
            forward: relative[0],
            yaw: relative[5],
            goal,
        }
    }

    /// Turns the base in place by `yaw`, then drives `forward` along the new heading.
    pub fn rotate_then_forward(&self, base: &Transform, forward: f64, yaw: f64) -> BaseGoal {
        let turn = Isometry3::rotation(Vector3::new(0.0, 0.0, yaw));
        let drive = Isometry3::translation(forward, 0.0, 0.0);
        BaseGoal {
            forward,
            yaw,
            goal: base * turn * drive,
        }
    }

    /// Turns the base to face the planar `direction` (world frame), then drives the distance
    /// that brings it to `goal` projected on that direction.
    pub fn drive_along_vector(&self, base: &Transform, direction: &Vector2<f64>, goal: &Vector2<f64>)
                              -> Result<BaseGoal, ControlError> {
        let length = direction.norm();
        if !length.is_finite() || length == 0.0 {
            return Err(ControlError::NotFinite("drive direction"));
        }
        let direction = direction / length;
        let position = base.translation.vector.xy();
        let distance = (goal - position).dot(&direction);
        let turn = normalize_angle(direction.y.atan2(direction.x) - yaw(base));
        Ok(self.rotate_then_forward(base, distance, turn))
    }
}

/// Wrap the angle into `[-pi, pi)`.
fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}
