//! Storage seams of the sensor subsystem.
//!
//! The PostgreSQL implementation lives in `crate::models`, tests run against
//! the in-memory store in `memory`.

use crate::error::DBError;
use chrono::{DateTime, Utc};
use sprout_core::{Reading, ReadingPayload, Sensor, SensorStatus};

#[cfg(test)]
pub mod memory;

#[derive(Debug, Clone)]
pub struct NewSensor {
    pub device_id: String,
    pub name: String,
    pub device_type: String,
    pub user_id: i32,
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub sensor_id: i32,
    pub metrics: ReadingPayload,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Plants are managed by an external collaborator, only ownership and the
/// sensor back-reference are visible here
#[derive(Debug, Clone, PartialEq)]
pub struct Plant {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub sensor_id: Option<i32>,
}

#[async_trait::async_trait]
pub trait SensorRepository: Send + Sync {
    /// Fails with `DBError::DuplicateDevice` if the device id is taken
    async fn insert_sensor(&self, sensor: NewSensor) -> Result<Sensor, DBError>;

    async fn sensor(&self, sensor_id: i32) -> Result<Option<Sensor>, DBError>;

    async fn sensor_by_device(&self, device_id: &str) -> Result<Option<Sensor>, DBError>;

    async fn plant(&self, plant_id: i32) -> Result<Option<Plant>, DBError>;

    /// Links sensor and plant in one transaction and activates the sensor.
    ///
    /// Only succeeds if the sensor still points to `expected_plant` and is
    /// not in maintenance (`DBError::Conflict` otherwise). The back-reference
    /// of `expected_plant` is cleared. A plant linked to another sensor
    /// yields `DBError::PlantOccupied`.
    async fn assign(
        &self,
        sensor_id: i32,
        expected_plant: Option<i32>,
        plant_id: i32,
    ) -> Result<(), DBError>;

    /// Clears both sides of the link and deactivates the sensor, guarded by
    /// the expected plant and status
    async fn release(
        &self,
        sensor_id: i32,
        expected_plant: Option<i32>,
        from: SensorStatus,
    ) -> Result<(), DBError>;

    async fn set_status(
        &self,
        sensor_id: i32,
        from: SensorStatus,
        to: SensorStatus,
    ) -> Result<(), DBError>;

    /// Number of registered sensors, doubles as a connectivity check
    async fn sensor_count(&self) -> Result<i64, DBError>;
}

#[async_trait::async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Persists the reading and bumps the sensor heartbeat atomically.
    ///
    /// Owner and plant are copied from the sensor row inside the same
    /// statement. Returns `None` if the sensor stopped accepting readings.
    async fn record(&self, reading: NewReading) -> Result<Option<Reading>, DBError>;

    async fn latest(&self, sensor_id: i32) -> Result<Option<Reading>, DBError>;

    /// Readings with `from <= timestamp < until`, oldest first
    async fn between(
        &self,
        sensor_id: i32,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Reading>, DBError>;
}
