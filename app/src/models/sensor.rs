use super::{is_unique_violation, CountRecord};
use crate::error::DBError;
use crate::repository::NewSensor;
use chrono::{DateTime, Utc};
use sprout_core::{Sensor, SensorStatus};

#[derive(sqlx::FromRow, Debug)]
pub struct SensorDao {
    pub(crate) id: i32,
    pub(crate) device_id: String,
    pub(crate) name: String,
    pub(crate) device_type: String,
    pub(crate) user_id: i32,
    pub(crate) plant_id: Option<i32>,
    pub(crate) status: String,
    pub(crate) last_connection: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
}

impl TryFrom<SensorDao> for Sensor {
    type Error = DBError;

    fn try_from(val: SensorDao) -> Result<Self, Self::Error> {
        let status: SensorStatus = val.status.parse().map_err(DBError::Corrupt)?;
        Ok(Sensor {
            id: val.id,
            device_id: val.device_id,
            name: val.name,
            device_type: val.device_type,
            user_id: val.user_id,
            plant_id: val.plant_id,
            status,
            last_connection: val.last_connection,
            created_at: val.created_at,
        })
    }
}

pub async fn insert(conn: &sqlx::PgPool, new_sensor: &NewSensor) -> Result<SensorDao, DBError> {
    let inserted = sql_stmnt!(
        SensorDao,
        r#"INSERT INTO sensors (device_id, name, device_type, user_id, status)
            VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
        new_sensor.device_id.as_str(),
        new_sensor.name.as_str(),
        new_sensor.device_type.as_str(),
        new_sensor.user_id,
        SensorStatus::Inactive.as_str()
    )
    .fetch_one(conn)
    .await;

    match inserted {
        Ok(dao) => Ok(dao),
        Err(e) if is_unique_violation(&e) => {
            Err(DBError::DuplicateDevice(new_sensor.device_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

// READ sensors
pub async fn get(conn: &sqlx::PgPool, sensor_id: i32) -> Result<Option<SensorDao>, DBError> {
    Ok(
        sql_stmnt!(SensorDao, "SELECT * FROM sensors WHERE id = $1", sensor_id)
            .fetch_optional(conn)
            .await?,
    )
}

pub async fn get_by_device(
    conn: &sqlx::PgPool,
    device_id: &str,
) -> Result<Option<SensorDao>, DBError> {
    Ok(sql_stmnt!(
        SensorDao,
        "SELECT * FROM sensors WHERE device_id = $1",
        device_id
    )
    .fetch_optional(conn)
    .await?)
}

pub async fn count(conn: &sqlx::PgPool) -> Result<i64, DBError> {
    let rows = sql_stmnt!(CountRecord, "SELECT count(*) as count FROM sensors")
        .fetch_one(conn)
        .await?;
    Ok(rows.count())
}

/// Moves the sensor to `plant_id`, see `SensorRepository::assign`.
///
/// The conditional update on the sensor row takes its row lock first, a
/// concurrent assignment of the same sensor re-evaluates the condition after
/// the lock is released and fails.
pub async fn assign(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    expected_plant: Option<i32>,
    plant_id: i32,
) -> Result<(), DBError> {
    let mut tx = conn.begin().await?;

    let claimed = sql_stmnt!(
        r#"UPDATE sensors SET plant_id = $2, status = $4
            WHERE id = $1 AND plant_id IS NOT DISTINCT FROM $3 AND status <> $5"#,
        sensor_id,
        plant_id,
        expected_plant,
        SensorStatus::Active.as_str(),
        SensorStatus::Maintenance.as_str()
    )
    .execute(&mut *tx)
    .await;

    let claimed = match claimed {
        Ok(result) => result,
        Err(e) if is_unique_violation(&e) => return Err(DBError::PlantOccupied(plant_id)),
        Err(e) => return Err(e.into()),
    };
    if claimed.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DBError::Conflict(sensor_id));
    }

    if let Some(previous) = expected_plant.filter(|previous| *previous != plant_id) {
        sql_stmnt!(
            "UPDATE plants SET sensor_id = NULL WHERE id = $1 AND sensor_id = $2",
            previous,
            sensor_id
        )
        .execute(&mut *tx)
        .await?;
    }

    let linked = sql_stmnt!(
        r#"UPDATE plants SET sensor_id = $1
            WHERE id = $2 AND (sensor_id IS NULL OR sensor_id = $1)"#,
        sensor_id,
        plant_id
    )
    .execute(&mut *tx)
    .await?;
    if linked.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DBError::PlantOccupied(plant_id));
    }

    tx.commit().await?;
    Ok(())
}

pub async fn release(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    expected_plant: Option<i32>,
    from: SensorStatus,
) -> Result<(), DBError> {
    let mut tx = conn.begin().await?;

    let released = sql_stmnt!(
        r#"UPDATE sensors SET plant_id = NULL, status = $4
            WHERE id = $1 AND plant_id IS NOT DISTINCT FROM $2 AND status = $3"#,
        sensor_id,
        expected_plant,
        from.as_str(),
        SensorStatus::Inactive.as_str()
    )
    .execute(&mut *tx)
    .await?;
    if released.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DBError::Conflict(sensor_id));
    }

    if let Some(previous) = expected_plant {
        sql_stmnt!(
            "UPDATE plants SET sensor_id = NULL WHERE id = $1 AND sensor_id = $2",
            previous,
            sensor_id
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn set_status(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    from: SensorStatus,
    to: SensorStatus,
) -> Result<(), DBError> {
    let updated = sql_stmnt!(
        "UPDATE sensors SET status = $3 WHERE id = $1 AND status = $2",
        sensor_id,
        from.as_str(),
        to.as_str()
    )
    .execute(conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DBError::Conflict(sensor_id));
    }
    Ok(())
}
