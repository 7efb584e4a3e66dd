use crate::error::DBError;
use crate::repository::NewReading;
use chrono::{DateTime, Utc};
use sprout_core::{Reading, SensorStatus};

#[derive(sqlx::FromRow)]
pub struct ReadingDao {
    pub(crate) id: i64,
    pub(crate) sensor_id: i32,
    pub(crate) user_id: i32,
    pub(crate) plant_id: i32,
    pub(crate) temperature: i32,
    pub(crate) air_humidity: f64,
    pub(crate) soil_moisture: f64,
    pub(crate) light_intensity: Option<i32>,
    pub(crate) electrical_conductivity: Option<f64>,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) created_at: DateTime<Utc>,
}

impl From<ReadingDao> for Reading {
    fn from(val: ReadingDao) -> Self {
        Reading {
            id: val.id,
            sensor_id: val.sensor_id,
            user_id: val.user_id,
            plant_id: val.plant_id,
            temperature: val.temperature,
            air_humidity: val.air_humidity,
            soil_moisture: val.soil_moisture,
            light_intensity: val.light_intensity,
            electrical_conductivity: val.electrical_conductivity,
            timestamp: val.timestamp,
            created_at: val.created_at,
        }
    }
}

/// Inserts the reading and updates the sensor heartbeat in one statement.
///
/// Owner and plant come from the locked sensor row, so a sensor that got
/// unassigned in the meantime yields no row instead of a stale attribution.
pub async fn insert(
    conn: &sqlx::PgPool,
    new_reading: &NewReading,
) -> Result<Option<ReadingDao>, DBError> {
    let metrics = &new_reading.metrics;
    Ok(sql_stmnt!(
        ReadingDao,
        r#"WITH sensor AS (
                UPDATE sensors SET last_connection = $2
                WHERE id = $1 AND status = $3 AND plant_id IS NOT NULL
                RETURNING id, user_id, plant_id
            )
            INSERT INTO readings
                (sensor_id, user_id, plant_id, temperature, air_humidity, soil_moisture,
                 light_intensity, electrical_conductivity, timestamp, created_at)
            SELECT sensor.id, sensor.user_id, sensor.plant_id, $4, $5, $6, $7, $8, $9, $2
            FROM sensor
            RETURNING *"#,
        new_reading.sensor_id,
        new_reading.received_at,
        SensorStatus::Active.as_str(),
        metrics.temperature,
        metrics.air_humidity,
        metrics.soil_moisture,
        metrics.light_intensity,
        metrics.electrical_conductivity,
        new_reading.timestamp
    )
    .fetch_optional(conn)
    .await?)
}

// READ readings
pub async fn get_latest(
    conn: &sqlx::PgPool,
    sensor_id: i32,
) -> Result<Option<ReadingDao>, DBError> {
    Ok(sql_stmnt!(
        ReadingDao,
        r#"SELECT * FROM readings
            WHERE sensor_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1"#,
        sensor_id
    )
    .fetch_optional(conn)
    .await?)
}

pub async fn get(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<ReadingDao>, DBError> {
    Ok(sql_stmnt!(
        ReadingDao,
        r#"SELECT * FROM readings
            WHERE sensor_id = $1
            AND timestamp >= $2 AND timestamp < $3
            ORDER BY timestamp ASC, id ASC"#,
        sensor_id,
        from,
        until
    )
    .fetch_all(conn)
    .await?)
}
