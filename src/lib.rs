//! Velocity-resolved inverse kinematics for a mobile manipulator (serial arm on a
//! differential drive base) following a Cartesian path with its end effector.
//!
//! The path is discretized into dense waypoints. For every waypoint, the combined
//! 6x(N+2) Jacobian of the arm and the base is assembled, and the joint and base
//! velocities are found through its pseudoinverse. Arm joints that would approach or
//! cross their position limits are removed from the solution and the velocities are
//! solved again with the remaining joints. The resulting velocities are bounded,
//! integrated into the next goal configuration and sent to the actuator; the loop
//! waits for completion before moving to the next waypoint.
//!
//! # Features
//!
//! - Conversion between rigid transforms and 6-value poses (translation + axis-angle).
//! - Path discretization with a fixed number of waypoints, and deterministic zig-zag
//!   patterns for testing.
//! - Jacobian of the arm (supplied by the kinematic model) combined with the differential
//!   drive base, driven by wheel rates or by forward speed and yaw rate.
//! - Joint limit aware pseudoinverse solver that always terminates, and reports joints
//!   that cannot be kept within limits instead of exceeding them.
//! - Path executor as an explicit state machine with injectable clock and cancellation.
//! - A simulated Fetch-like robot and actuator to run everything without hardware.
//! - Parameters from YAML files (feature `allow_filesystem`).
//!
//! ## Example
//!
//! ```
//! use mobile_diff_ik::executor::{ManualClock, PathExecutor};
//! use mobile_diff_ik::geometry::transform_to_pose;
//! use mobile_diff_ik::kinematic_traits::KinematicModel;
//! use mobile_diff_ik::parameters::Parameters;
//! use mobile_diff_ik::patterns::zigzag_pattern;
//! use mobile_diff_ik::simulated::{SimulatedActuator, SimulatedRobot};
//!
//! let robot = SimulatedRobot::fetch();
//! let start = transform_to_pose(&robot.end_effector_transform());
//! let path = zigzag_pattern(&start, 10, 2);
//!
//! let actuator = SimulatedActuator::new(robot.clone());
//! let mut executor = PathExecutor::new(robot, actuator, ManualClock::new(), Parameters::fetch());
//! let trace = executor.execute_path(&path, 20).expect("path must be executable");
//! assert_eq!(trace.steps.len(), trace.waypoints.len() - 1);
//! ```

pub mod kinematic_traits;

pub mod parameters;
pub mod parameters_robots;

#[cfg(feature = "allow_filesystem")]
pub mod parameters_from_file;

pub mod parameter_error;
pub mod control_error;

#[path = "utils/utils.rs"]
pub mod utils;

pub mod geometry;

#[path = "path_plan/discretizer.rs"]
pub mod path;

#[path = "path_plan/patterns.rs"]
pub mod patterns;

pub mod jacobian;

pub mod solver;

pub mod base;

pub mod executor;

pub mod simulated;
