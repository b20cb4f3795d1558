//! Hardcoded parameters for a few mobile manipulators

use crate::parameters::{BaseInput, ControlParameters, DriveParameters, Parameters};
use std::time::Duration;

#[allow(dead_code)]
impl Parameters {
    // Control loop defaults shared by all presets
    fn default_control() -> ControlParameters {
        ControlParameters {
            unit_time: 1.0,
            arm_damping: 0.25,
            base_command_gain: 1.0 / 20.0,
            joint_limit_tolerance: 3e-2,
            enforce_velocity_limits: false,
            singular_epsilon: 1e-10,
            poll_interval: Duration::from_millis(50),
            completion_timeout: Duration::from_secs(10),
        }
    }

    /// Fetch mobile manipulator. The wheel radius is the effective value the base
    /// controller was calibrated with, not the physical wheel.
    pub fn fetch() -> Self {
        Parameters {
            drive: DriveParameters {
                wheel_radius: 0.0125,
                axle_length: 0.37476,
                input: BaseInput::WheelRates,
            },
            control: Self::default_control(),
        }
    }

    /// Base that takes forward speed and yaw rate directly (no wheel model).
    pub fn unicycle() -> Self {
        Parameters {
            drive: DriveParameters {
                wheel_radius: 1.0,
                axle_length: 1.0,
                input: BaseInput::Twist,
            },
            control: Self::default_control(),
        }
    }

    /// TurtleBot 3 Waffle drive (wheel radius 33 mm, wheel separation 287 mm)
    pub fn turtlebot3_waffle() -> Self {
        Parameters {
            drive: DriveParameters {
                wheel_radius: 0.033,
                axle_length: 0.287,
                input: BaseInput::WheelRates,
            },
            control: Self::default_control(),
        }
    }
}
