//! Supports reading control loop parameters from YAML file (optional)

use std::path::Path;
use std::time::Duration;
use serde::Deserialize;

use crate::parameter_error::ParameterError;
use crate::parameters::{BaseInput, Parameters};

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DriveSection {
    #[serde(default)]
    pub wheel_radius: Option<f64>,
    #[serde(default)]
    pub axle_length: Option<f64>,
    #[serde(default)]
    pub base_input: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ControlSection {
    #[serde(default)]
    pub unit_time: Option<f64>,
    #[serde(default)]
    pub arm_damping: Option<f64>,
    #[serde(default)]
    pub base_command_gain: Option<f64>,
    #[serde(default)]
    pub joint_limit_tolerance: Option<f64>,
    #[serde(default)]
    pub enforce_velocity_limits: Option<bool>,
    #[serde(default)]
    pub singular_epsilon: Option<f64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub completion_timeout_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct Root {
    #[serde(default)]
    pub drive: DriveSection,
    #[serde(default)]
    pub control: ControlSection,
}

impl Parameters {
    /// Read the control loop configuration from YAML file. YAML file like this is supported:
    /// ```yaml
    /// # Fetch in the lab
    /// drive:
    ///   wheel_radius: 0.0125
    ///   axle_length: 0.37476
    ///   base_input: wheel_rates
    /// control:
    ///   unit_time: 1.0
    ///   arm_damping: 0.25
    ///   base_command_gain: 0.05
    ///   joint_limit_tolerance: 0.03
    ///   enforce_velocity_limits: false
    ///   poll_interval_ms: 50
    ///   completion_timeout_ms: 10000
    /// ```
    /// All fields are optional, missing values are taken from [Parameters::fetch].
    /// The result is validated before returning.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Same as [Parameters::from_yaml_file], reading from the string.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ParameterError> {
        let root: Root = if contents.trim().is_empty() {
            Root::default()
        } else {
            serde_saphyr::from_str(contents)
                .map_err(|e| ParameterError::ParseError(format!("{}", e)))?
        };

        let mut parameters = Parameters::fetch();
        let drive = &mut parameters.drive;
        if let Some(r) = root.drive.wheel_radius {
            drive.wheel_radius = r;
        }
        if let Some(l) = root.drive.axle_length {
            drive.axle_length = l;
        }
        if let Some(input) = root.drive.base_input {
            drive.input = input.parse::<BaseInput>()?;
        }

        let control = &mut parameters.control;
        let section = root.control;
        if let Some(v) = section.unit_time {
            control.unit_time = v;
        }
        if let Some(v) = section.arm_damping {
            control.arm_damping = v;
        }
        if let Some(v) = section.base_command_gain {
            control.base_command_gain = v;
        }
        if let Some(v) = section.joint_limit_tolerance {
            control.joint_limit_tolerance = v;
        }
        if let Some(v) = section.enforce_velocity_limits {
            control.enforce_velocity_limits = v;
        }
        if let Some(v) = section.singular_epsilon {
            control.singular_epsilon = v;
        }
        if let Some(ms) = section.poll_interval_ms {
            control.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = section.completion_timeout_ms {
            control.completion_timeout = Duration::from_millis(ms);
        }

        parameters.validate()?;
        Ok(parameters)
    }
}
