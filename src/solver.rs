//! Velocity-resolved inverse kinematics for the arm + base with joint limit avoidance.
//!
//! The desired end effector velocity is the per-component difference between the target
//! and the current pose divided by the unit time. Joint and base velocities are obtained
//! through the pseudoinverse of the full Jacobian. If some arm joint would move towards
//! and beyond its position limit (or outside its admissible velocity range), the joint
//! is removed from the active set and the velocities are solved again with the remaining
//! joints. The active set only shrinks, so at most N + 1 solves are needed for N arm joints.
//!
//! Predictions are always made from the current configuration, not from the previous
//! prediction: the robot has not moved between two passes of the same step.

use nalgebra::{DVector, Vector6};
use tracing::debug;

use crate::control_error::ControlError;
use crate::geometry::transform_to_pose;
use crate::jacobian::Jacobian;
use crate::kinematic_traits::{Joints, KinematicModel, Limits, Pose, VelocityCommand, VelocityLimits};
use crate::parameters::{DriveParameters, Parameters};
use crate::utils::is_valid;

/// Desired end effector velocity to move from `start` to `end` within `unit_time`.
/// The orientation difference is taken component-wise on the axis-angle representation,
/// which is only meaningful for small rotations.
pub fn pose_velocity(start: &Pose, end: &Pose, unit_time: f64) -> Vector6<f64> {
    (end - start) / unit_time
}

/// Clips every velocity component into `[min, max]` of the corresponding limit. Components
/// without limit (beyond `limits.len()`) pass unchanged.
pub fn bound_velocity(velocity: &DVector<f64>, limits: &VelocityLimits) -> DVector<f64> {
    DVector::from_iterator(
        velocity.len(),
        velocity.iter().enumerate().map(|(i, &v)| {
            if i < limits.len() {
                v.max(limits.min[i]).min(limits.max[i])
            } else {
                v
            }
        }),
    )
}

/// Clips the configuration component-wise into the position limits.
pub fn bound_joint_limits(joints: &Joints, limits: &Limits) -> Joints {
    bound_velocity(joints, limits)
}

/// Result of one solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Bounded arm and base velocities
    pub command: VelocityCommand,

    /// Arm joints removed from the solution by the limit avoidance, in removal order
    pub eliminated: Vec<usize>,

    /// Number of pseudoinverse solves performed
    pub passes: usize,
}

/// Differential IK solver. Holds only parameters; the Jacobian and its pseudoinverse
/// are computed anew for every solve.
#[derive(Debug, Clone)]
pub struct DifferentialIk {
    pub drive: DriveParameters,
    pub unit_time: f64,
    pub joint_limit_tolerance: f64,
    pub singular_epsilon: f64,
}

impl DifferentialIk {
    pub fn new(parameters: &Parameters) -> Self {
        DifferentialIk {
            drive: parameters.drive,
            unit_time: parameters.control.unit_time,
            joint_limit_tolerance: parameters.control.joint_limit_tolerance,
            singular_epsilon: parameters.control.singular_epsilon,
        }
    }

    /// Solves for the current state of the model. If `velocity_limits` is None, velocities
    /// are unbounded and only position limits are observed.
    pub fn solve_for(&self, model: &impl KinematicModel, target: &Pose,
                     velocity_limits: Option<&VelocityLimits>) -> Result<Solution, ControlError> {
        let joints = model.active_joint_values();
        let current = transform_to_pose(&model.end_effector_transform());
        let jacobian = Jacobian::new(model, &joints, &self.drive, self.singular_epsilon)?;
        let unbounded;
        let velocity_limits = match velocity_limits {
            Some(limits) => limits,
            None => {
                unbounded = Limits::unbounded(joints.len());
                &unbounded
            }
        };
        self.solve(&jacobian, &current, target, &joints, &model.joint_limits(), velocity_limits)
    }

    /// Computes the bounded velocity command that moves the end effector from `current`
    /// towards `target` during one unit of time.
    ///
    /// # Arguments
    ///
    /// * `jacobian` - the full Jacobian for `joints`
    /// * `current`, `target` - end effector poses
    /// * `joints` - current arm configuration
    /// * `position_limits` - arm joint position limits
    /// * `velocity_limits` - arm velocity limits (N values), optionally followed by
    ///   the 2 base velocity limits
    ///
    /// # Returns
    ///
    /// The velocities, or [ControlError::JointLimitUnreachable] if an arm joint would end up
    /// outside its limits widened by the tolerance, even though the solver stopped it.
    /// A joint that starts outside its limits is accepted while it moves back towards them.
    pub fn solve(&self, jacobian: &Jacobian, current: &Pose, target: &Pose, joints: &Joints,
                 position_limits: &Limits, velocity_limits: &VelocityLimits) -> Result<Solution, ControlError> {
        let n = jacobian.arm_dof();
        check_len("arm joints", n, joints.len())?;
        check_len("position limits", n, position_limits.len())?;
        if velocity_limits.len() != n && velocity_limits.len() != n + 2 {
            return Err(ControlError::DimensionMismatch {
                what: "velocity limits", expected: n, found: velocity_limits.len() });
        }

        let desired = pose_velocity(current, target, self.unit_time);
        if !is_valid(desired.as_slice()) {
            return Err(ControlError::NotFinite("end effector velocity"));
        }
        let admissible = self.admissible_velocities(joints, position_limits, velocity_limits);

        let mut active = vec![true; n];
        let mut eliminated = Vec::new();
        for pass in 1..=n + 1 {
            let q_dot = jacobian.velocities_masked(&desired, &active)?;
            let violating: Vec<usize> = (0..n)
                .filter(|&i| active[i] && self.violates(i, q_dot[i], joints, position_limits, &admissible))
                .collect();
            debug!(pass, ?violating, "limit avoidance pass");

            if violating.is_empty() {
                self.check_reachable(&q_dot, joints, position_limits)?;
                let bounded = bound_velocity(&q_dot, velocity_limits);
                return Ok(Solution {
                    command: VelocityCommand::from_stacked(&bounded),
                    eliminated,
                    passes: pass,
                });
            }
            for i in violating {
                active[i] = false;
                eliminated.push(i);
            }
        }

        // All arm joints eliminated yet still violating: only possible with inconsistent limits
        let joint = eliminated.last().copied().unwrap_or(0);
        Err(ControlError::JointLimitUnreachable {
            joint,
            value: joints[joint],
            min: position_limits.min[joint],
            max: position_limits.max[joint],
        })
    }

    /// Velocity range of each arm joint for this step. Near or beyond a position limit,
    /// the range is collapsed to zero on the side of that limit.
    fn admissible_velocities(&self, joints: &Joints, position_limits: &Limits,
                             velocity_limits: &VelocityLimits) -> Vec<(f64, f64)> {
        let tolerance = self.joint_limit_tolerance;
        (0..joints.len())
            .map(|i| {
                let (mut low, mut high) = (velocity_limits.min[i], velocity_limits.max[i]);
                if joints[i] <= position_limits.min[i] + tolerance {
                    low = 0.0;
                } else if joints[i] >= position_limits.max[i] - tolerance {
                    high = 0.0;
                }
                (low, high)
            })
            .collect()
    }

    /// Joint `i` moving with `velocity` leaves its admissible velocity range, or would
    /// enter the tolerance band near a position limit while moving towards it.
    fn violates(&self, i: usize, velocity: f64, joints: &Joints, position_limits: &Limits,
                admissible: &[(f64, f64)]) -> bool {
        let (low, high) = admissible[i];
        if velocity < low || velocity > high {
            return true;
        }
        let predicted = joints[i] + velocity * self.unit_time;
        let tolerance = self.joint_limit_tolerance;
        (velocity > 0.0 && predicted > position_limits.max[i] - tolerance)
            || (velocity < 0.0 && predicted < position_limits.min[i] + tolerance)
    }

    /// The predicted configuration must stay within the limits widened by the tolerance,
    /// unless the joint is already outside and moving back towards its range.
    fn check_reachable(&self, q_dot: &DVector<f64>, joints: &Joints, position_limits: &Limits)
                       -> Result<(), ControlError> {
        let tolerance = self.joint_limit_tolerance;
        for i in 0..joints.len() {
            let predicted = joints[i] + q_dot[i] * self.unit_time;
            let above = predicted > position_limits.max[i] + tolerance && q_dot[i] >= 0.0;
            let below = predicted < position_limits.min[i] - tolerance && q_dot[i] <= 0.0;
            if above || below {
                return Err(ControlError::JointLimitUnreachable {
                    joint: i,
                    value: predicted,
                    min: position_limits.min[i],
                    max: position_limits.max[i],
                });
            }
        }
        Ok(())
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), ControlError> {
    if expected != found {
        return Err(ControlError::DimensionMismatch { what, expected, found });
    }
    Ok(())
}
