use crate::SensorStatus;
use std::error;
use std::fmt;

/// A telemetry value outside of its accepted range
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    field: &'static str,
    reason: std::string::String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<std::string::String>) -> Self {
        ValidationError {
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.field, self.reason)
    }
}

impl error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub enum StateError {
    SensorInactive(std::string::String),
    UnassignedSensor(std::string::String),
    InvalidTransition(SensorStatus, SensorStatus),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StateError::SensorInactive(device) => write!(f, "Sensor is not active: {}", device),
            StateError::UnassignedSensor(device) => {
                write!(f, "Sensor is not assigned to a plant: {}", device)
            }
            StateError::InvalidTransition(from, to) => {
                write!(f, "Invalid sensor transition: {} -> {}", from, to)
            }
        }
    }
}

impl error::Error for StateError {}
