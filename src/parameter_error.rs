//! Error handling for configuration loading and validation

use std::io;

/// Unified error to report failures while reading or validating [crate::parameters::Parameters].
#[derive(Debug)]
pub enum ParameterError {
    IoError(io::Error),
    ParseError(String),
    UnknownBaseInput(String),
    NotFinite(&'static str),
    NotPositive(&'static str),
    OutOfRange { field: &'static str, value: f64, min: f64, max: f64 },
}

impl std::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ParameterError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
            ParameterError::ParseError(ref msg) =>
                write!(f, "Parse Error: {}", msg),
            ParameterError::UnknownBaseInput(ref value) =>
                write!(f, "Unknown base input '{}', expected wheel_rates or twist", value),
            ParameterError::NotFinite(field) =>
                write!(f, "Parameter {} must be finite", field),
            ParameterError::NotPositive(field) =>
                write!(f, "Parameter {} must be positive", field),
            ParameterError::OutOfRange { field, value, min, max } =>
                write!(f, "Parameter {} = {} is outside [{}, {}]", field, value, min, max),
        }
    }
}

impl std::error::Error for ParameterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParameterError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ParameterError {
    fn from(err: io::Error) -> Self {
        ParameterError::IoError(err)
    }
}
