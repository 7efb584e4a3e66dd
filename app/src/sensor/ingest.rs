use super::{bounded, SensorContext};
use crate::cache::keys;
use crate::error::ServiceError;
use crate::repository::NewReading;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sprout_core::error::StateError;
use sprout_core::{local_date, today, Reading, ReadingPayload};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Acknowledgement sent back to a device
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Receipt {
    pub reading_id: i64,
    pub plant_id: i32,
    pub plant_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Write path for device telemetry
pub struct IngestOrchestrator {
    inner: Arc<SensorContext>,
}

impl Clone for IngestOrchestrator {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl IngestOrchestrator {
    pub fn new(inner: Arc<SensorContext>) -> Self {
        IngestOrchestrator { inner }
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline()
    }

    #[tracing::instrument(skip(self, deadline, payload))]
    pub async fn receive(
        &self,
        deadline: Instant,
        device_id: &str,
        payload: ReadingPayload,
    ) -> Result<Receipt, ServiceError> {
        let sensor = bounded(
            "resolve_device",
            deadline,
            self.inner.sensors.sensor_by_device(device_id),
        )
        .await?
        .ok_or_else(|| ServiceError::InvalidDevice(device_id.to_owned()))?;

        sensor.accepting_plant()?;
        let received_at = Utc::now();
        payload.validate_at(received_at)?;

        let new_reading = NewReading {
            sensor_id: sensor.id,
            timestamp: payload.timestamp.unwrap_or(received_at),
            metrics: payload,
            received_at,
        };
        let reading = bounded(
            "record_reading",
            deadline,
            self.inner.readings.record(new_reading),
        )
        .await?
        // Sensor was unassigned between lookup and write
        .ok_or_else(|| StateError::SensorInactive(sensor.device_id.clone()))?;

        self.invalidate(&reading, deadline).await;
        info!(
            sensor_id = reading.sensor_id,
            reading_id = reading.id,
            "Stored reading"
        );

        let plant_name = match bounded(
            "load_plant",
            deadline,
            self.inner.sensors.plant(reading.plant_id),
        )
        .await
        {
            Ok(plant) => plant.map(|plant| plant.name),
            Err(e) => {
                warn!(plant_id = reading.plant_id, "Plant name unavailable: {}", e);
                None
            }
        };

        Ok(Receipt {
            reading_id: reading.id,
            plant_id: reading.plant_id,
            plant_name,
            timestamp: reading.timestamp,
        })
    }

    /// Drops every cached view the new reading belongs to. Runs after the
    /// write committed and gets at least the cache timeout even if the
    /// request deadline is nearly spent.
    async fn invalidate(&self, reading: &Reading, deadline: Instant) {
        let settings = &self.inner.settings;
        let deadline = std::cmp::max(deadline, Instant::now() + settings.cache_timeout);

        let mut dates = vec![today(&settings.timezone)];
        let bucket = local_date(reading.timestamp, &settings.timezone);
        if !dates.contains(&bucket) {
            dates.push(bucket);
        }

        let mut stale = vec![keys::latest(reading.sensor_id)];
        for date in dates {
            stale.push(keys::daily_readings(reading.sensor_id, date));
            stale.push(keys::daily_average(reading.sensor_id, date));
        }
        self.inner.cache.delete(&stale, deadline).await;
    }
}
