use super::{bounded, SensorContext};
use crate::cache::keys;
use crate::error::{Resource, ServiceError};
use crate::repository::NewSensor;
use sprout_core::error::ValidationError;
use sprout_core::{Sensor, SensorStatus};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Sensor identity, ownership and plant assignment
pub struct SensorRegistry {
    inner: Arc<SensorContext>,
}

impl Clone for SensorRegistry {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl SensorRegistry {
    pub fn new(inner: Arc<SensorContext>) -> Self {
        SensorRegistry { inner }
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline()
    }

    #[tracing::instrument(skip(self, deadline, name, device_type))]
    pub async fn register(
        &self,
        deadline: Instant,
        user_id: i32,
        device_id: &str,
        name: &str,
        device_type: &str,
    ) -> Result<Sensor, ServiceError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(ValidationError::new("device_id", "must not be empty").into());
        }
        if bounded(
            "lookup_device",
            deadline,
            self.inner.sensors.sensor_by_device(device_id),
        )
        .await?
        .is_some()
        {
            return Err(ServiceError::DuplicateDevice(device_id.to_owned()));
        }

        let new_sensor = NewSensor {
            device_id: device_id.to_owned(),
            name: name.to_owned(),
            device_type: device_type.to_owned(),
            user_id,
        };
        let sensor = bounded(
            "insert_sensor",
            deadline,
            self.inner.sensors.insert_sensor(new_sensor),
        )
        .await?;

        info!(sensor_id = sensor.id, "Registered new sensor");
        Ok(sensor)
    }

    pub async fn sensor(
        &self,
        deadline: Instant,
        sensor_id: i32,
        user_id: i32,
    ) -> Result<Sensor, ServiceError> {
        self.inner.owned_sensor(deadline, sensor_id, user_id).await
    }

    /// Binds the sensor to `plant_id`, replacing a previous plant
    #[tracing::instrument(skip(self, deadline))]
    pub async fn assign(
        &self,
        deadline: Instant,
        sensor_id: i32,
        plant_id: i32,
        user_id: i32,
    ) -> Result<(), ServiceError> {
        let sensor = self.inner.owned_sensor(deadline, sensor_id, user_id).await?;
        let plant = bounded("load_plant", deadline, self.inner.sensors.plant(plant_id))
            .await?
            .ok_or(ServiceError::NotFound(Resource::Plant))?;
        if plant.user_id != user_id {
            return Err(ServiceError::Forbidden(Resource::Plant));
        }

        sensor.status.transition(SensorStatus::Active)?;
        if let Some(other) = plant.sensor_id.filter(|other| *other != sensor.id) {
            return Err(ServiceError::Conflict(format!(
                "Plant {} is assigned to sensor {}",
                plant_id, other
            )));
        }

        bounded(
            "assign_sensor",
            deadline,
            self.inner.sensors.assign(sensor.id, sensor.plant_id, plant_id),
        )
        .await?;

        info!(previous_plant = ?sensor.plant_id, "Assigned sensor");
        Ok(())
    }

    /// Detaches the sensor from its plant. Also the way out of maintenance.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn unassign(
        &self,
        deadline: Instant,
        sensor_id: i32,
        user_id: i32,
    ) -> Result<(), ServiceError> {
        let sensor = self.inner.owned_sensor(deadline, sensor_id, user_id).await?;
        if sensor.status == SensorStatus::Inactive && sensor.plant_id.is_none() {
            debug!("Sensor already unassigned");
            return Ok(());
        }

        sensor.status.transition(SensorStatus::Inactive)?;
        bounded(
            "release_sensor",
            deadline,
            self.inner
                .sensors
                .release(sensor.id, sensor.plant_id, sensor.status),
        )
        .await?;

        // Released sensors start over with a cold cache
        let deadline = std::cmp::max(deadline, Instant::now() + self.inner.settings.cache_timeout);
        self.inner
            .cache
            .invalidate_prefix(&keys::sensor_prefix(sensor.id), deadline)
            .await;

        info!(previous_plant = ?sensor.plant_id, "Unassigned sensor");
        Ok(())
    }

    /// Administrative switch into maintenance, the plant link is kept
    #[tracing::instrument(skip(self, deadline))]
    pub async fn start_maintenance(
        &self,
        deadline: Instant,
        sensor_id: i32,
        user_id: i32,
    ) -> Result<(), ServiceError> {
        let sensor = self.inner.owned_sensor(deadline, sensor_id, user_id).await?;
        let next = sensor.status.transition(SensorStatus::Maintenance)?;
        bounded(
            "set_status",
            deadline,
            self.inner.sensors.set_status(sensor.id, sensor.status, next),
        )
        .await?;

        info!(from = %sensor.status, "Sensor in maintenance");
        Ok(())
    }
}
