//! Sensor use cases: registry, ingestion and cached reads.
//!
//! All façades share one `SensorContext`, built once at startup with the
//! repositories and the cache injected.

use crate::cache::{Cache, CacheStats};
use crate::error::{DBError, Resource, ServiceError};
use crate::repository::{ReadingRepository, SensorRepository};
use chrono_tz::Tz;
use sprout_core::Sensor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::error;

pub mod ingest;
pub mod query;
pub mod registry;

#[cfg(test)]
mod test;

pub use ingest::{IngestOrchestrator, Receipt};
pub use query::ReadingQueries;
pub use registry::SensorRegistry;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub latest_ttl: Duration,
    pub daily_ttl: Duration,
    pub request_timeout: Duration,
    pub cache_timeout: Duration,
    /// Zone in which day buckets start and end
    pub timezone: Tz,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            latest_ttl: Duration::from_secs(15 * 60),
            daily_ttl: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_secs(5),
            cache_timeout: Duration::from_millis(250),
            timezone: Tz::UTC,
        }
    }
}

pub struct SensorContext {
    pub(crate) sensors: Arc<dyn SensorRepository>,
    pub(crate) readings: Arc<dyn ReadingRepository>,
    pub(crate) cache: Cache,
    pub(crate) settings: ServiceSettings,
}

impl std::fmt::Debug for SensorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorContext")
            .field("settings", &self.settings)
            .finish()
    }
}

impl SensorContext {
    pub fn new(
        sensors: Arc<dyn SensorRepository>,
        readings: Arc<dyn ReadingRepository>,
        cache: Cache,
        settings: ServiceSettings,
    ) -> Arc<Self> {
        Arc::new(SensorContext {
            sensors,
            readings,
            cache,
            settings,
        })
    }

    /// Deadline for all store and cache calls of a request starting now
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.settings.request_timeout
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn sensor_count(&self) -> Result<i64, ServiceError> {
        bounded("sensor_count", self.deadline(), self.sensors.sensor_count()).await
    }

    /// Loads a sensor and checks that `user_id` owns it
    pub(crate) async fn owned_sensor(
        &self,
        deadline: Instant,
        sensor_id: i32,
        user_id: i32,
    ) -> Result<Sensor, ServiceError> {
        let sensor = bounded("load_sensor", deadline, self.sensors.sensor(sensor_id))
            .await?
            .ok_or(ServiceError::NotFound(Resource::Sensor))?;
        if !sensor.is_owned_by(user_id) {
            return Err(ServiceError::Forbidden(Resource::Sensor));
        }
        Ok(sensor)
    }
}

/// Runs a store call within the request deadline.
///
/// Storage failures are logged with the operation name here, the caller's
/// span carries the sensor id.
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    deadline: Instant,
    fut: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, DBError>>,
{
    match timeout_at(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let err = ServiceError::storage(operation, e);
            if err.is_internal() {
                error!(operation = operation, "{}", err);
            }
            Err(err)
        }
        Err(_) => {
            error!(operation = operation, "Store call exceeded request deadline");
            Err(ServiceError::Timeout(operation))
        }
    }
}
