use super::{bounded, SensorContext};
use crate::cache::keys;
use crate::error::{Resource, ServiceError};
use chrono::NaiveDate;
use sprout_core::{day_bounds, today, DailyAggregate, Reading};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Cached read path for dashboards
pub struct ReadingQueries {
    inner: Arc<SensorContext>,
}

impl Clone for ReadingQueries {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ReadingQueries {
    pub fn new(inner: Arc<SensorContext>) -> Self {
        ReadingQueries { inner }
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline()
    }

    pub fn today(&self) -> NaiveDate {
        today(&self.inner.settings.timezone)
    }

    /// Newest reading by event time. Absence is not cached.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn latest(
        &self,
        deadline: Instant,
        sensor_id: i32,
        user_id: i32,
    ) -> Result<Reading, ServiceError> {
        self.inner.owned_sensor(deadline, sensor_id, user_id).await?;

        let key = keys::latest(sensor_id);
        if let Some(reading) = self.inner.cache.get::<Reading>(&key, deadline).await {
            return Ok(reading);
        }

        let reading = bounded(
            "latest_reading",
            deadline,
            self.inner.readings.latest(sensor_id),
        )
        .await?
        .ok_or(ServiceError::NotFound(Resource::Reading))?;

        self.inner
            .cache
            .set(&key, &reading, self.inner.settings.latest_ttl, deadline)
            .await;
        Ok(reading)
    }

    #[tracing::instrument(skip(self, deadline))]
    pub async fn daily_readings(
        &self,
        deadline: Instant,
        sensor_id: i32,
        date: NaiveDate,
        user_id: i32,
    ) -> Result<Vec<Reading>, ServiceError> {
        self.inner.owned_sensor(deadline, sensor_id, user_id).await?;
        self.cached_day(deadline, sensor_id, date).await
    }

    /// Statistics of one day, cached apart from the readings they are
    /// computed from
    #[tracing::instrument(skip(self, deadline))]
    pub async fn daily_average(
        &self,
        deadline: Instant,
        sensor_id: i32,
        date: NaiveDate,
        user_id: i32,
    ) -> Result<DailyAggregate, ServiceError> {
        self.inner.owned_sensor(deadline, sensor_id, user_id).await?;

        let key = keys::daily_average(sensor_id, date);
        if let Some(aggregate) = self.inner.cache.get::<DailyAggregate>(&key, deadline).await {
            return Ok(aggregate);
        }

        let readings = self.cached_day(deadline, sensor_id, date).await?;
        let aggregate = DailyAggregate::compute(sensor_id, date, &readings)
            .ok_or(ServiceError::NotFound(Resource::Aggregate))?;

        self.inner
            .cache
            .set(&key, &aggregate, self.inner.settings.daily_ttl, deadline)
            .await;
        Ok(aggregate)
    }

    async fn cached_day(
        &self,
        deadline: Instant,
        sensor_id: i32,
        date: NaiveDate,
    ) -> Result<Vec<Reading>, ServiceError> {
        let key = keys::daily_readings(sensor_id, date);
        if let Some(readings) = self.inner.cache.get::<Vec<Reading>>(&key, deadline).await {
            return Ok(readings);
        }

        let (from, until) = day_bounds(date, &self.inner.settings.timezone);
        let readings = bounded(
            "daily_readings",
            deadline,
            self.inner.readings.between(sensor_id, from, until),
        )
        .await?;
        debug!(count = readings.len(), "Loaded day from store");

        if !readings.is_empty() {
            self.inner
                .cache
                .set(&key, &readings, self.inner.settings.daily_ttl, deadline)
                .await;
        }
        Ok(readings)
    }
}
