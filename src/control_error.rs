//! Errors of the control path (discretization, solving, execution)

use std::time::Duration;
use thiserror::Error;

use crate::kinematic_traits::JointCommand;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Discretization needs at least the start and the end pose.
    #[error("At least 2 poses are required to discretize a path, found {found}")]
    InsufficientWaypoints { found: usize },

    #[error("Dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// The limit avoidance could not keep the joint within its position limits,
    /// even after removing it from the solution.
    #[error("Joint {joint} cannot be kept within limits [{min}, {max}], predicted value {value}")]
    JointLimitUnreachable {
        joint: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Non-finite value in {0}")]
    NotFinite(&'static str),

    #[error("Unable to compute the pseudoinverse of the Jacobian matrix: {0}")]
    Pseudoinverse(&'static str),

    #[error("Link '{0}' is not known to the kinematic model")]
    UnknownLink(String),

    #[error("Actuator did not complete step {step} within {waited:?}, last command {command:?}")]
    ActuatorTimeout {
        step: usize,
        command: JointCommand,
        waited: Duration,
    },

    #[error("Actuator failed at step {step}: {source}")]
    ActuatorFailure {
        step: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Execution cancelled at step {step}")]
    Cancelled { step: usize },

    #[error("Step {step} failed: {source}")]
    StepFailed {
        step: usize,
        #[source]
        source: Box<ControlError>,
    },
}

impl ControlError {
    /// Index of the waypoint step this error relates to, if known.
    pub fn step(&self) -> Option<usize> {
        match self {
            ControlError::ActuatorTimeout { step, .. }
            | ControlError::ActuatorFailure { step, .. }
            | ControlError::Cancelled { step }
            | ControlError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The innermost error, unwrapping [ControlError::StepFailed].
    pub fn root(&self) -> &ControlError {
        match self {
            ControlError::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
