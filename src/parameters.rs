//! Defines the drive and control parameter data structures

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::parameter_error::ParameterError;

/// Meaning of the 2 base DOF in the combined Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseInput {
    /// Left and right wheel angular rates. Forward speed is `r/2 (left + right)`,
    /// yaw rate is `r/l (right - left)`.
    WheelRates,
    /// Forward speed and yaw rate of the base directly.
    Twist,
}

impl fmt::Display for BaseInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseInput::WheelRates => write!(f, "wheel_rates"),
            BaseInput::Twist => write!(f, "twist"),
        }
    }
}

impl FromStr for BaseInput {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "wheel_rates" => Ok(BaseInput::WheelRates),
            "twist" => Ok(BaseInput::Twist),
            other => Err(ParameterError::UnknownBaseInput(other.to_string())),
        }
    }
}

/// Geometry of the differential drive base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveParameters {
    /// Wheel radius, meters
    pub wheel_radius: f64,

    /// Distance between the two drive wheels, meters
    pub axle_length: f64,

    pub input: BaseInput,
}

/// Gains, tolerances and timing of the control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParameters {
    /// Duration of one control step in the units of the velocities (velocity = delta / unit_time).
    pub unit_time: f64,

    /// Gain applied to the arm joint velocities before integrating them into the next goal.
    pub arm_damping: f64,

    /// Gain applied to the base displacement and yaw before dispatching
    /// (calibration between predicted motion and actuator units).
    pub base_command_gain: f64,

    /// Band near the joint position limits where motion towards the limit is not allowed.
    pub joint_limit_tolerance: f64,

    /// If false, the solver runs with unbounded velocity limits and only the position
    /// limits are enforced.
    pub enforce_velocity_limits: bool,

    /// Singular values below this are treated as zero by the pseudoinverse.
    pub singular_epsilon: f64,

    /// Sleep between two completion checks of the actuator.
    pub poll_interval: Duration,

    /// How long to wait for the actuator to complete one step.
    pub completion_timeout: Duration,
}

/// All parameters of the mobile manipulator control loop.
/// See [parameters_robots.rs](parameters_robots.rs) for presets of concrete robots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub drive: DriveParameters,
    pub control: ControlParameters,
}

impl Parameters {
    /// Check that all values are physically meaningful.
    pub fn validate(&self) -> Result<(), ParameterError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ParameterError> {
            if !value.is_finite() {
                return Err(ParameterError::NotFinite(field));
            }
            if value <= 0.0 {
                return Err(ParameterError::NotPositive(field));
            }
            Ok(())
        }

        fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ParameterError> {
            if !value.is_finite() {
                return Err(ParameterError::NotFinite(field));
            }
            if value < min || value > max {
                return Err(ParameterError::OutOfRange { field, value, min, max });
            }
            Ok(())
        }

        positive("wheel_radius", self.drive.wheel_radius)?;
        positive("axle_length", self.drive.axle_length)?;
        positive("unit_time", self.control.unit_time)?;
        in_range("arm_damping", self.control.arm_damping, 0.0, 1.0)?;
        positive("base_command_gain", self.control.base_command_gain)?;
        in_range("joint_limit_tolerance", self.control.joint_limit_tolerance, 0.0, 1.0)?;
        in_range("singular_epsilon", self.control.singular_epsilon, 0.0, 1.0)?;
        if self.control.poll_interval.is_zero() {
            return Err(ParameterError::NotPositive("poll_interval_ms"));
        }
        if self.control.completion_timeout < self.control.poll_interval {
            return Err(ParameterError::OutOfRange {
                field: "completion_timeout_ms",
                value: self.control.completion_timeout.as_millis() as f64,
                min: self.control.poll_interval.as_millis() as f64,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }

    /// Convert to string yaml representation (quick viewing, etc).
    pub fn to_yaml(&self) -> String {
        format!(
            "drive:\n  \
              wheel_radius: {}\n  \
              axle_length: {}\n  \
              base_input: {}\n\
            control:\n  \
              unit_time: {}\n  \
              arm_damping: {}\n  \
              base_command_gain: {}\n  \
              joint_limit_tolerance: {}\n  \
              enforce_velocity_limits: {}\n  \
              singular_epsilon: {:e}\n  \
              poll_interval_ms: {}\n  \
              completion_timeout_ms: {}\n",
            self.drive.wheel_radius,
            self.drive.axle_length,
            self.drive.input,
            self.control.unit_time,
            self.control.arm_damping,
            self.control.base_command_gain,
            self.control.joint_limit_tolerance,
            self.control.enforce_velocity_limits,
            self.control.singular_epsilon,
            self.control.poll_interval.as_millis(),
            self.control.completion_timeout.as_millis(),
        )
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::fetch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_input_parsing() {
        assert_eq!("wheel_rates".parse::<BaseInput>().unwrap(), BaseInput::WheelRates);
        assert_eq!(" twist ".parse::<BaseInput>().unwrap(), BaseInput::Twist);
        assert!("omni".parse::<BaseInput>().is_err());
        assert_eq!(BaseInput::Twist.to_string(), "twist");
    }

    #[test]
    fn test_preset_is_valid() {
        assert!(Parameters::fetch().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut parameters = Parameters::fetch();
        parameters.drive.axle_length = 0.0;
        assert!(matches!(parameters.validate(), Err(ParameterError::NotPositive("axle_length"))));

        let mut parameters = Parameters::fetch();
        parameters.control.arm_damping = 1.5;
        assert!(matches!(
            parameters.validate(),
            Err(ParameterError::OutOfRange { field: "arm_damping", .. })
        ));

        let mut parameters = Parameters::fetch();
        parameters.control.unit_time = f64::NAN;
        assert!(matches!(parameters.validate(), Err(ParameterError::NotFinite("unit_time"))));

        let mut parameters = Parameters::fetch();
        parameters.control.completion_timeout = Duration::from_millis(1);
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn test_yaml_mentions_all_fields() {
        let yaml = Parameters::fetch().to_yaml();
        for field in ["wheel_radius", "axle_length", "base_input: wheel_rates", "arm_damping",
            "base_command_gain", "joint_limit_tolerance", "poll_interval_ms: 50",
            "completion_timeout_ms: 10000"] {
            assert!(yaml.contains(field), "{} missing in\n{}", field, yaml);
        }
    }
}
