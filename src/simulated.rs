//! In-memory mobile manipulator: a serial chain of revolute joints on a differential
//! drive base. Implements [KinematicModel] with analytic Jacobian blocks, and comes with
//! an [Actuator] that applies the dispatched commands to the same shared state.
//! Used by the tests and the demo binary in place of a real robot.

extern crate nalgebra as na;

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use na::{DMatrix, Isometry3, Translation3, Unit, UnitQuaternion, Vector3};

use crate::kinematic_traits::{Actuator, Color, JointCommand, Joints, KinematicModel, Limits, PlotSink, Pose, Transform, VelocityLimits};
use crate::solver::bound_joint_limits;
use crate::utils::deg;

/// Revolute joint of the simulated arm.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub name: String,

    /// Name of the link this joint moves
    pub link: String,

    /// Transform from the previous joint frame (or the arm mount) to this joint at zero angle
    pub origin: Transform,

    /// Rotation axis in the joint frame
    pub axis: Unit<Vector3<f64>>,

    pub min: f64,
    pub max: f64,
    pub max_velocity: f64,
}

impl RevoluteJoint {
    pub fn new(name: &str, link: &str, offset: [f64; 3], axis: Vector3<f64>,
               limits: (f64, f64), max_velocity: f64) -> Self {
        RevoluteJoint {
            name: name.to_string(),
            link: link.to_string(),
            origin: Translation3::new(offset[0], offset[1], offset[2]).into(),
            axis: Unit::new_normalize(axis),
            min: limits.0,
            max: limits.1,
            max_velocity,
        }
    }

    /// Joint without position limits
    pub fn continuous(name: &str, link: &str, offset: [f64; 3], axis: Vector3<f64>, max_velocity: f64) -> Self {
        Self::new(name, link, offset, axis, (f64::NEG_INFINITY, f64::INFINITY), max_velocity)
    }

    fn motion(&self, angle: f64) -> Transform {
        self.origin * UnitQuaternion::from_axis_angle(&self.axis, angle)
    }
}

#[derive(Debug)]
struct SimulatedState {
    joints: Joints,
    base: Transform,
}

/// Arm configuration of the Fetch robot above a table, used as the demo start.
pub const FETCH_TABLE_CONFIGURATION: [f64; 7] =
    [0.70503065, -0.81321057, 0.44084394, 1.52903305, -0.37976212, 0.92392059, 0.8291418];

/// Simulated mobile manipulator. Clones share the same state.
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    chain: Arc<Vec<RevoluteJoint>>,

    /// Arm mount on the base
    mount: Transform,

    /// Fixed transform from the last joint to the end effector
    tool: Transform,
    tool_link: String,

    /// Links rigidly attached to the end effector, with their transform relative to it
    attachments: Vec<(String, Transform)>,

    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedRobot {
    /// Robot with all joints at zero and the base at the world origin.
    pub fn new(chain: Vec<RevoluteJoint>, mount: Transform, tool: Transform, tool_link: &str) -> Self {
        let n = chain.len();
        SimulatedRobot {
            chain: Arc::new(chain),
            mount,
            tool,
            tool_link: tool_link.to_string(),
            attachments: Vec::new(),
            state: Arc::new(Mutex::new(SimulatedState {
                joints: Joints::zeros(n),
                base: Transform::identity(),
            })),
        }
    }

    /// The 7 DOF arm of the Fetch robot (dimensions and limits after the Fetch URDF),
    /// torso down, placed at [FETCH_TABLE_CONFIGURATION]. The end effector is the
    /// `wrist_roll_link`; the `gripper_link` is attached to it.
    pub fn fetch() -> Self {
        let y = Vector3::y();
        let x = Vector3::x();
        let chain = vec![
            RevoluteJoint::new("shoulder_pan_joint", "shoulder_pan_link", [0.0, 0.0, 0.0], Vector3::z(), (-1.6056, 1.6056), 1.256),
            RevoluteJoint::new("shoulder_lift_joint", "shoulder_lift_link", [0.117, 0.0, 0.06], y, (-1.221, 1.518), 1.454),
            RevoluteJoint::continuous("upperarm_roll_joint", "upperarm_roll_link", [0.219, 0.0, 0.0], x, 1.571),
            RevoluteJoint::new("elbow_flex_joint", "elbow_flex_link", [0.133, 0.0, 0.0], y, (-2.251, 2.251), 1.521),
            RevoluteJoint::continuous("forearm_roll_joint", "forearm_roll_link", [0.197, 0.0, 0.0], x, 1.571),
            RevoluteJoint::new("wrist_flex_joint", "wrist_flex_link", [0.1245, 0.0, 0.0], y, (-2.16, 2.16), 2.268),
            RevoluteJoint::continuous("wrist_roll_joint", "wrist_roll_link", [0.1385, 0.0, 0.0], x, 2.268),
        ];
        let robot = Self::new(
            chain,
            Translation3::new(0.03265, 0.0, 0.72601).into(),
            Transform::identity(),
            "wrist_roll_link",
        )
        .with_attachment("gripper_link", Translation3::new(0.16645, 0.0, 0.0).into());
        robot.set_joints(&Joints::from_column_slice(&FETCH_TABLE_CONFIGURATION));
        robot
    }

    /// Attach a link rigidly to the end effector.
    pub fn with_attachment(mut self, link: &str, offset: Transform) -> Self {
        self.attachments.push((link.to_string(), offset));
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_joints(&self, joints: &Joints) {
        assert_eq!(joints.len(), self.chain.len(), "wrong number of joints");
        self.lock().joints = joints.clone();
    }

    pub fn set_base(&self, base: Transform) {
        self.lock().base = base;
    }

    pub fn joint_names(&self) -> Vec<&str> {
        self.chain.iter().map(|j| j.name.as_str()).collect()
    }

    /// End effector transform for the given joints and the current base.
    pub fn forward(&self, joints: &Joints) -> Transform {
        let base = self.lock().base;
        let (_, tool) = self.frames(joints, &base);
        tool
    }

    /// World frames of all joints (after their rotation) and of the end effector.
    fn frames(&self, joints: &Joints, base: &Transform) -> (Vec<Transform>, Transform) {
        let mut current = base * self.mount;
        let mut frames = Vec::with_capacity(self.chain.len());
        for (joint, &angle) in self.chain.iter().zip(joints.iter()) {
            current *= joint.motion(angle);
            frames.push(current);
        }
        (frames, current * self.tool)
    }

    /// Moves the arm to the commanded configuration (clamped into the limits) and drives
    /// the base forward and around its vertical axis, both scaled by `base_scale`.
    pub fn apply(&self, command: &JointCommand, base_scale: f64) {
        let limits = self.joint_limits();
        let mut state = self.lock();
        state.joints = bound_joint_limits(&command.arm, &limits);
        let motion = Isometry3::new(
            Vector3::new(command.base_forward * base_scale, 0.0, 0.0),
            Vector3::new(0.0, 0.0, command.base_yaw * base_scale),
        );
        state.base *= motion;
    }

    /// Human readable joint table (YAML), limits in degrees.
    pub fn describe(&self) -> String {
        let mut text = String::from("joints:\n");
        for joint in self.chain.iter() {
            let limits = if joint.min.is_finite() && joint.max.is_finite() {
                format!("[{}, {}]", deg(&joint.min), deg(&joint.max))
            } else {
                "continuous".to_string()
            };
            text.push_str(&format!(
                "  - name: {}\n    limits: {}\n    max_velocity: {}\n",
                joint.name, limits, joint.max_velocity
            ));
        }
        text.push_str(&format!("end_effector: {}\n", self.tool_link));
        text
    }
}

impl KinematicModel for SimulatedRobot {
    fn dof(&self) -> usize {
        self.chain.len()
    }

    /// Geometric Jacobian: for a revolute joint with the world axis `z` through the point
    /// `p`, the linear column is `z x (p_ee - p)` and the angular column is `z`.
    fn arm_jacobian_blocks(&self, joints: &Joints) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = self.chain.len();
        let base = self.lock().base;
        let (frames, tool) = self.frames(joints, &base);
        let end_effector = tool.translation.vector;

        let mut linear = DMatrix::zeros(3, n);
        let mut angular = DMatrix::zeros(3, n);
        for (i, (joint, frame)) in self.chain.iter().zip(frames.iter()).enumerate() {
            let axis = frame.rotation * joint.axis.into_inner();
            let lever = end_effector - frame.translation.vector;
            linear.fixed_view_mut::<3, 1>(0, i).copy_from(&axis.cross(&lever));
            angular.fixed_view_mut::<3, 1>(0, i).copy_from(&axis);
        }
        (linear, angular)
    }

    fn end_effector_transform(&self) -> Transform {
        let state = self.lock();
        let (_, tool) = self.frames(&state.joints, &state.base);
        tool
    }

    fn base_transform(&self) -> Transform {
        self.lock().base
    }

    fn joint_limits(&self) -> Limits {
        let min: Vec<f64> = self.chain.iter().map(|j| j.min).collect();
        let max: Vec<f64> = self.chain.iter().map(|j| j.max).collect();
        Limits::from_slices(&min, &max)
    }

    fn velocity_limits(&self) -> VelocityLimits {
        let limits: Vec<f64> = self.chain.iter().map(|j| j.max_velocity).collect();
        Limits::symmetric(&limits)
    }

    fn active_joint_values(&self) -> Joints {
        self.lock().joints.clone()
    }

    fn link_transform(&self, link: &str) -> Option<Transform> {
        let state = self.lock();
        if link == "base_link" {
            return Some(state.base);
        }
        let (frames, tool) = self.frames(&state.joints, &state.base);
        if link == self.tool_link {
            return Some(tool);
        }
        if let Some(i) = self.chain.iter().position(|j| j.link == link) {
            return Some(frames[i]);
        }
        self.attachments
            .iter()
            .find(|(name, _)| name == link)
            .map(|(_, offset)| tool * offset)
    }
}

struct PendingCommand {
    handle: u64,
    command: JointCommand,
    polls: usize,
}

/// Actuator that applies commands to a [SimulatedRobot] after a number of polls.
pub struct SimulatedActuator {
    robot: SimulatedRobot,

    /// Polls needed to complete a command, None to never complete
    polls_to_complete: Option<usize>,

    /// If set, every dispatch fails with this message
    failure: Option<String>,

    /// Conversion from command units to meters and radians for the base
    base_scale: f64,

    pending: Option<PendingCommand>,
    next_handle: u64,
    history: Vec<JointCommand>,
}

impl SimulatedActuator {
    /// Actuator completing every command on the first poll.
    pub fn new(robot: SimulatedRobot) -> Self {
        SimulatedActuator {
            robot,
            polls_to_complete: Some(1),
            failure: None,
            base_scale: 1.0,
            pending: None,
            next_handle: 0,
            history: Vec::new(),
        }
    }

    pub fn completing_after(mut self, polls: usize) -> Self {
        self.polls_to_complete = Some(polls.max(1));
        self
    }

    /// Commands are accepted but never complete.
    pub fn stalled(mut self) -> Self {
        self.polls_to_complete = None;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn with_base_scale(mut self, base_scale: f64) -> Self {
        self.base_scale = base_scale;
        self
    }

    /// All commands dispatched so far
    pub fn history(&self) -> &[JointCommand] {
        &self.history
    }
}

impl Actuator for SimulatedActuator {
    type Handle = u64;

    fn dispatch(&mut self, command: &JointCommand) -> anyhow::Result<u64> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        if command.arm.len() != self.robot.dof() {
            return Err(anyhow!("expected {} joints, got {}", self.robot.dof(), command.arm.len()));
        }
        self.next_handle += 1;
        self.history.push(command.clone());
        self.pending = Some(PendingCommand {
            handle: self.next_handle,
            command: command.clone(),
            polls: 0,
        });
        Ok(self.next_handle)
    }

    fn is_done(&mut self, handle: &u64) -> anyhow::Result<bool> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(true);
        };
        if pending.handle != *handle {
            return Ok(*handle < pending.handle);
        }
        pending.polls += 1;
        match self.polls_to_complete {
            Some(needed) if pending.polls >= needed => {
                self.robot.apply(&pending.command, self.base_scale);
                self.pending = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}

/// Plot sink that remembers all plotted points. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct PlotRecorder {
    points: Arc<Mutex<Vec<(Pose, f64, Color)>>>,
}

impl PlotRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<(Pose, f64, Color)> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn count(&self, color: Color) -> usize {
        self.points().iter().filter(|(_, _, c)| *c == color).count()
    }
}

impl PlotSink for PlotRecorder {
    fn plot_point(&mut self, pose: &Pose, size: f64, color: Color) -> anyhow::Result<()> {
        self.points
            .lock()
            .map_err(|_| anyhow!("plot recorder poisoned"))?
            .push((*pose, size, color));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{transform_between_links, transform_to_pose};

    #[test]
    fn test_fetch_stretched_out() {
        let robot = SimulatedRobot::fetch();
        robot.set_joints(&Joints::zeros(7));
        let tool = robot.end_effector_transform().translation.vector;
        assert!((tool.x - 0.96165).abs() < 1e-9, "x = {}", tool.x);
        assert!(tool.y.abs() < 1e-12);
        assert!((tool.z - 0.78601).abs() < 1e-9, "z = {}", tool.z);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let robot = SimulatedRobot::fetch();
        robot.set_base(Isometry3::new(Vector3::new(0.5, -0.2, 0.0), Vector3::new(0.0, 0.0, 0.3)));
        let joints = robot.active_joint_values();
        let (linear, angular) = robot.arm_jacobian_blocks(&joints);
        let current = robot.forward(&joints);
        let epsilon = 1e-7;
        for i in 0..7 {
            let mut perturbed = joints.clone();
            perturbed[i] += epsilon;
            let moved = robot.forward(&perturbed);
            let dp = (moved.translation.vector - current.translation.vector) / epsilon;
            let dr = (moved.rotation * current.rotation.inverse()).scaled_axis() / epsilon;
            for k in 0..3 {
                assert!((linear[(k, i)] - dp[k]).abs() < 1e-5, "linear[{},{}]", k, i);
                assert!((angular[(k, i)] - dr[k]).abs() < 1e-5, "angular[{},{}]", k, i);
            }
        }
    }

    #[test]
    fn test_link_transforms() {
        let robot = SimulatedRobot::fetch();
        let offset = transform_between_links(&robot, "gripper_link", "wrist_roll_link").unwrap();
        let pose = transform_to_pose(&offset);
        assert!((pose[0] - 0.16645).abs() < 1e-12);
        assert!(pose[1].abs() < 1e-12 && pose[2].abs() < 1e-12);
        assert!(pose.fixed_rows::<3>(3).norm() < 1e-12);
        assert!(robot.link_transform("no_such_link").is_none());
    }

    #[test]
    fn test_actuator_applies_after_polls() {
        let robot = SimulatedRobot::fetch();
        let mut actuator = SimulatedActuator::new(robot.clone()).completing_after(3);
        let command = JointCommand {
            arm: Joints::from_element(7, 0.1),
            base_forward: 0.2,
            base_yaw: 0.0,
        };
        let handle = actuator.dispatch(&command).unwrap();
        assert!(actuator.is_busy());
        assert!(!actuator.is_done(&handle).unwrap());
        assert!(!actuator.is_done(&handle).unwrap());
        assert!(actuator.is_done(&handle).unwrap());
        assert!(!actuator.is_busy());
        assert_eq!(robot.active_joint_values(), Joints::from_element(7, 0.1));
        assert!((robot.base_transform().translation.vector.x - 0.2).abs() < 1e-12);
        assert_eq!(actuator.history().len(), 1);
    }

    #[test]
    fn test_actuator_clamps_to_limits() {
        let robot = SimulatedRobot::fetch();
        let mut actuator = SimulatedActuator::new(robot.clone());
        let command = JointCommand { arm: Joints::from_element(7, 5.0), base_forward: 0.0, base_yaw: 0.0 };
        let handle = actuator.dispatch(&command).unwrap();
        assert!(actuator.is_done(&handle).unwrap());
        let joints = robot.active_joint_values();
        assert_eq!(joints[0], 1.6056);
        assert_eq!(joints[2], 5.0); // continuous
    }

    #[test]
    fn test_failing_actuator() {
        let mut actuator = SimulatedActuator::new(SimulatedRobot::fetch()).failing("emergency stop");
        let command = JointCommand { arm: Joints::zeros(7), base_forward: 0.0, base_yaw: 0.0 };
        let error = actuator.dispatch(&command).unwrap_err();
        assert_eq!(error.to_string(), "emergency stop");
    }

    #[test]
    fn test_describe() {
        let text = SimulatedRobot::fetch().describe();
        assert!(text.contains("upperarm_roll_joint\n    limits: continuous"));
        assert!(text.contains("end_effector: wrist_roll_link"));
    }
}
