//! Value types shared by all components and the collaborator traits the control loop
//! is written against (kinematic model, actuator, plot sink).

extern crate nalgebra as na;
use na::{DMatrix, DVector, Isometry3, Vector2, Vector6};

/// Pose of a frame as 6 values `[x, y, z, rx, ry, rz]`: Cartesian translation followed by
/// the axis-angle orientation (rotation axis scaled by the rotation angle, zero vector
/// being the identity orientation).
/// ```
/// extern crate nalgebra as na;
/// use mobile_diff_ik::kinematic_traits::Pose;
///
/// // 10 cm forward, rotated 90 degrees around z
/// let pose = Pose::new(0.1, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2);
/// assert_eq!(pose[0], 0.1);
/// ```
pub type Pose = Vector6<f64>;

/// Rigid homogeneous transform. This is the canonical representation for chaining frame
/// relationships; use `to_homogeneous()` if the 4x4 matrix itself is needed.
pub type Transform = Isometry3<f64>;

/// Joint values of the arm (radians for revolute joints), one entry per arm DOF.
pub type Joints = DVector<f64>;

/// Per-component `(min, max)` limits, used both for joint positions and for velocities.
/// Unbounded components are represented as `-inf .. inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    pub min: DVector<f64>,
    pub max: DVector<f64>,
}

/// Velocity limits, arm joints first, optionally followed by the 2 base components.
pub type VelocityLimits = Limits;

impl Limits {
    /// Limits from explicit lower and upper bounds.
    ///
    /// # Panics
    ///
    /// If `min` and `max` have different lengths.
    pub fn new(min: DVector<f64>, max: DVector<f64>) -> Self {
        assert_eq!(min.len(), max.len(), "min and max limits must have the same length");
        Limits { min, max }
    }

    /// Same as [Limits::new], panics if the slices have different lengths.
    pub fn from_slices(min: &[f64], max: &[f64]) -> Self {
        Self::new(DVector::from_column_slice(min), DVector::from_column_slice(max))
    }

    /// Symmetric limits `-limit .. limit` for every component.
    pub fn symmetric(limits: &[f64]) -> Self {
        let max = DVector::from_column_slice(limits).map(f64::abs);
        Limits { min: -max.clone(), max }
    }

    /// No limits at all for `n` components.
    pub fn unbounded(n: usize) -> Self {
        Limits {
            min: DVector::from_element(n, f64::NEG_INFINITY),
            max: DVector::from_element(n, f64::INFINITY),
        }
    }

    pub fn len(&self) -> usize {
        self.min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty()
    }

    /// True if the value of the component `i` is within limits (inclusive)
    pub fn contains(&self, i: usize, value: f64) -> bool {
        value >= self.min[i] && value <= self.max[i]
    }

    /// Append further components, typically the base limits after the arm limits.
    pub fn extended(&self, other: &Limits) -> Limits {
        let n = self.len();
        let mut min = DVector::zeros(n + other.len());
        let mut max = DVector::zeros(n + other.len());
        min.rows_mut(0, n).copy_from(&self.min);
        max.rows_mut(0, n).copy_from(&self.max);
        min.rows_mut(n, other.len()).copy_from(&other.min);
        max.rows_mut(n, other.len()).copy_from(&other.max);
        Limits { min, max }
    }
}

/// Velocity command produced by the differential IK solver for one control step.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityCommand {
    /// Arm joint velocities
    pub arm: DVector<f64>,
    /// The 2 base DOF rates (wheel rates or forward speed / yaw rate, depending on
    /// [crate::parameters::BaseInput]).
    pub base: Vector2<f64>,
}

impl VelocityCommand {
    /// Split the stacked `[arm | base]` solver output.
    ///
    /// # Panics
    ///
    /// If `q_dot` has fewer than the 2 base components.
    pub fn from_stacked(q_dot: &DVector<f64>) -> Self {
        assert!(q_dot.len() >= 2, "stacked velocities must contain the 2 base components");
        let n = q_dot.len() - 2;
        VelocityCommand {
            arm: q_dot.rows(0, n).into_owned(),
            base: Vector2::new(q_dot[n], q_dot[n + 1]),
        }
    }

    /// Stacked `[arm | base]` representation, as multiplied by the full Jacobian.
    pub fn stacked(&self) -> DVector<f64> {
        let n = self.arm.len();
        let mut q_dot = DVector::zeros(n + 2);
        q_dot.rows_mut(0, n).copy_from(&self.arm);
        q_dot[n] = self.base[0];
        q_dot[n + 1] = self.base[1];
        q_dot
    }
}

/// Goal configuration sent to the actuator: target arm joint positions and the planar
/// base motion (forward displacement and yaw change in the base frame). Lateral base
/// displacement is always zero for a differential drive and is not part of the command.
#[derive(Debug, Clone, PartialEq)]
pub struct JointCommand {
    pub arm: Joints,
    pub base_forward: f64,
    pub base_yaw: f64,
}

/// Kinematic model of the mobile manipulator. Implementations report the live state
/// of the robot (simulated or real); the control loop only queries it.
pub trait KinematicModel {
    /// Number of arm joints (N). The base adds 2 more DOF.
    fn dof(&self) -> usize;

    /// Linear (3xN) and angular (3xN) velocity Jacobian blocks of the end effector for
    /// the given arm configuration and the current base placement.
    fn arm_jacobian_blocks(&self, joints: &Joints) -> (DMatrix<f64>, DMatrix<f64>);

    /// Current end effector transform in the world frame.
    fn end_effector_transform(&self) -> Transform;

    /// Current transform of the mobile base in the world frame.
    fn base_transform(&self) -> Transform;

    /// Position limits of the arm joints.
    fn joint_limits(&self) -> Limits;

    /// Velocity limits of the arm joints.
    fn velocity_limits(&self) -> VelocityLimits;

    /// Current values of the arm joints.
    fn active_joint_values(&self) -> Joints;

    /// Transform of the named link in the world frame, if the model knows this link.
    fn link_transform(&self, _link: &str) -> Option<Transform> {
        None
    }
}

/// Controller that executes [JointCommand]s (robot driver or simulator).
pub trait Actuator {
    type Handle;

    /// Start executing the command. Must not block until completion.
    fn dispatch(&mut self, command: &JointCommand) -> anyhow::Result<Self::Handle>;

    /// True once the dispatched command is fully applied. After this returns true,
    /// the state reported by the kinematic model must reflect the command.
    fn is_done(&mut self, handle: &Self::Handle) -> anyhow::Result<bool>;

    /// True if some previously dispatched command is still in progress.
    fn is_busy(&self) -> bool {
        false
    }
}

/// RGBA color of plotted markers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub [f32; 4]);

impl Color {
    pub const RED: Color = Color([1.0, 0.0, 0.0, 1.0]);
    pub const BLUE: Color = Color([0.0, 0.0, 1.0, 1.0]);
    pub const PINK: Color = Color([1.0, 0.0, 0.5, 1.0]);
    pub const YELLOW: Color = Color([1.0, 1.0, 0.0, 1.0]);
}

/// Observer that visualizes poses (only the translation is normally plotted).
/// Failures are logged by the caller and never abort a control step.
pub trait PlotSink {
    fn plot_point(&mut self, pose: &Pose, size: f64, color: Color) -> anyhow::Result<()>;

    fn plot_points(&mut self, poses: &[Pose], size: f64, color: Color) -> anyhow::Result<()> {
        for pose in poses {
            self.plot_point(pose, size, color)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_limits() {
        let limits = Limits::symmetric(&[1.0, -2.0]);
        assert_eq!(limits.min.as_slice(), &[-1.0, -2.0]);
        assert_eq!(limits.max.as_slice(), &[1.0, 2.0]);
        assert!(limits.contains(1, -2.0));
        assert!(!limits.contains(0, 1.5));
    }

    #[test]
    fn test_extended_limits() {
        let arm = Limits::symmetric(&[1.0, 2.0, 3.0]);
        let all = arm.extended(&Limits::unbounded(2));
        assert_eq!(all.len(), 5);
        assert_eq!(all.max[2], 3.0);
        assert!(all.max[4].is_infinite());
    }

    #[test]
    fn test_velocity_command_stacking() {
        let q_dot = DVector::from_column_slice(&[0.1, 0.2, 0.3, 1.0, -1.0]);
        let command = VelocityCommand::from_stacked(&q_dot);
        assert_eq!(command.arm.len(), 3);
        assert_eq!(command.base, Vector2::new(1.0, -1.0));
        assert_eq!(command.stacked(), q_dot);
    }

    #[test]
    #[should_panic(expected = "2 base components")]
    fn test_velocity_command_without_base() {
        VelocityCommand::from_stacked(&DVector::from_column_slice(&[0.1]));
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_limits_length_mismatch() {
        Limits::from_slices(&[-1.0, -1.0], &[1.0]);
    }
}
