use sprout_core::error::{StateError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DBError {
    #[error(transparent)]
    SQLError(#[from] sqlx::Error),
    #[error("Device already registered: {0}")]
    DuplicateDevice(String),
    #[error("Sensor {0} was modified concurrently")]
    Conflict(i32),
    #[error("Plant {0} already has a sensor")]
    PlantOccupied(i32),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("Invalid cache entry: {0}")]
    Payload(String),
    #[error("Cache call timed out")]
    Timeout,
    #[error("Cache is not connected")]
    Unavailable,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Payload(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Sensor,
    Plant,
    Reading,
    Aggregate,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Sensor => f.write_str("Sensor"),
            Resource::Plant => f.write_str("Plant"),
            Resource::Reading => f.write_str("Reading"),
            Resource::Aggregate => f.write_str("Aggregate"),
        }
    }
}

/// Everything a sensor operation can fail with, one variant per HTTP status class
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Device already registered: {0}")]
    DuplicateDevice(String),
    #[error("Unknown device: {0}")]
    InvalidDevice(String),
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("{0} belongs to another user")]
    Forbidden(Resource),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Conflicting assignment: {0}")]
    Conflict(String),
    #[error("Storage failure in {0}: {1}")]
    Storage(&'static str, DBError),
    #[error("Deadline exceeded in {0}")]
    Timeout(&'static str),
}

impl ServiceError {
    pub fn storage(operation: &'static str, err: DBError) -> Self {
        match err {
            DBError::DuplicateDevice(device) => ServiceError::DuplicateDevice(device),
            DBError::Conflict(_) | DBError::PlantOccupied(_) => {
                ServiceError::Conflict(err.to_string())
            }
            err => ServiceError::Storage(operation, err),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ServiceError::Storage(..) | ServiceError::Timeout(_))
    }
}
