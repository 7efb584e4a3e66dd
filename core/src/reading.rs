use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use utoipa::ToSchema;

pub const TEMPERATURE_RANGE: RangeInclusive<i32> = -20..=60;
pub const PERCENT_RANGE: RangeInclusive<f64> = 0.0..=100.0;
/// How far a device clock may run ahead of the server
pub const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

/// Telemetry as sent by a device, before it is bound to a sensor row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReadingPayload {
    pub temperature: i32,
    pub air_humidity: f64,
    pub soil_moisture: f64,
    #[serde(default)]
    pub light_intensity: Option<i32>,
    #[serde(default)]
    pub electrical_conductivity: Option<f64>,
    /// Event time, the server assigns one when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReadingPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(Utc::now())
    }

    /// Checks every field in declaration order and reports the first one
    /// out of range. NaN never passes, event times may not lie beyond `now`
    /// plus the allowed clock skew.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(out_of_range(
                "temperature",
                self.temperature,
                &TEMPERATURE_RANGE,
            ));
        }
        if !PERCENT_RANGE.contains(&self.air_humidity) {
            return Err(out_of_range(
                "air_humidity",
                self.air_humidity,
                &PERCENT_RANGE,
            ));
        }
        if !PERCENT_RANGE.contains(&self.soil_moisture) {
            return Err(out_of_range(
                "soil_moisture",
                self.soil_moisture,
                &PERCENT_RANGE,
            ));
        }
        if let Some(light) = self.light_intensity {
            if light < 0 {
                return Err(ValidationError::new(
                    "light_intensity",
                    format!("{} must not be negative", light),
                ));
            }
        }
        if let Some(conductivity) = self.electrical_conductivity {
            if conductivity.is_nan() || conductivity < 0.0 {
                return Err(ValidationError::new(
                    "electrical_conductivity",
                    format!("{} must not be negative", conductivity),
                ));
            }
        }
        if let Some(timestamp) = self.timestamp {
            let horizon = now + Duration::seconds(MAX_CLOCK_SKEW_SECS);
            if timestamp > horizon {
                return Err(ValidationError::new(
                    "timestamp",
                    format!("{} is ahead of server time {}", timestamp, now),
                ));
            }
        }
        Ok(())
    }
}

fn out_of_range<T: std::fmt::Display>(
    field: &'static str,
    value: T,
    range: &RangeInclusive<T>,
) -> ValidationError {
    ValidationError::new(
        field,
        format!("{} not in [{}, {}]", value, range.start(), range.end()),
    )
}

/// A persisted reading. Owner and plant are copied from the sensor at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub id: i64,
    pub sensor_id: i32,
    pub user_id: i32,
    pub plant_id: i32,
    pub temperature: i32,
    pub air_humidity: f64,
    pub soil_moisture: f64,
    pub light_intensity: Option<i32>,
    pub electrical_conductivity: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
