use crate::error::DBError;
use crate::repository::{NewReading, NewSensor, Plant, ReadingRepository, SensorRepository};
use chrono::{DateTime, Utc};
use sprout_core::{Reading, Sensor, SensorStatus};

macro_rules! sql_stmnt {
    ($ret:ident, $stmt:expr) => {
        sqlx::query_as::<_ ,$ret>($stmt)
    };
    ($stmt:expr) => {
        sqlx::query($stmt)
    };
    ($ret:ident, $stmt:expr, $($bind:expr),*) => {
        sqlx::query_as::<_ ,$ret>($stmt)$(.bind($bind))*
    };
    ($stmt:expr, $($bind:expr),*) => {
        sqlx::query($stmt)$(.bind($bind))*
    };
}

pub async fn establish_db_connection(
    database_url: &str,
    max_connections: u32,
) -> Result<sqlx::PgPool, DBError> {
    Ok(sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?)
}

pub async fn check_schema(conn: &sqlx::PgPool) -> Result<(), DBError> {
    for table in ["sensors", "plants", "readings"] {
        sql_stmnt!(&format!("SELECT count(*) as count FROM {}", table))
            .fetch_one(conn)
            .await?;
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
pub(crate) struct CountRecord {
    pub count: Option<i64>,
}

impl CountRecord {
    pub fn count(self) -> i64 {
        self.count.unwrap_or(0)
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// PostgreSQL backed repositories
#[derive(Clone)]
pub struct PgStore {
    conn: sqlx::PgPool,
}

impl PgStore {
    pub fn new(conn: sqlx::PgPool) -> Self {
        PgStore { conn }
    }
}

#[async_trait::async_trait]
impl SensorRepository for PgStore {
    async fn insert_sensor(&self, new_sensor: NewSensor) -> Result<Sensor, DBError> {
        sensor::insert(&self.conn, &new_sensor).await?.try_into()
    }

    async fn sensor(&self, sensor_id: i32) -> Result<Option<Sensor>, DBError> {
        sensor::get(&self.conn, sensor_id)
            .await?
            .map(Sensor::try_from)
            .transpose()
    }

    async fn sensor_by_device(&self, device_id: &str) -> Result<Option<Sensor>, DBError> {
        sensor::get_by_device(&self.conn, device_id)
            .await?
            .map(Sensor::try_from)
            .transpose()
    }

    async fn plant(&self, plant_id: i32) -> Result<Option<Plant>, DBError> {
        Ok(plant::get(&self.conn, plant_id).await?.map(Plant::from))
    }

    async fn assign(
        &self,
        sensor_id: i32,
        expected_plant: Option<i32>,
        plant_id: i32,
    ) -> Result<(), DBError> {
        sensor::assign(&self.conn, sensor_id, expected_plant, plant_id).await
    }

    async fn release(
        &self,
        sensor_id: i32,
        expected_plant: Option<i32>,
        from: SensorStatus,
    ) -> Result<(), DBError> {
        sensor::release(&self.conn, sensor_id, expected_plant, from).await
    }

    async fn set_status(
        &self,
        sensor_id: i32,
        from: SensorStatus,
        to: SensorStatus,
    ) -> Result<(), DBError> {
        sensor::set_status(&self.conn, sensor_id, from, to).await
    }

    async fn sensor_count(&self) -> Result<i64, DBError> {
        sensor::count(&self.conn).await
    }
}

#[async_trait::async_trait]
impl ReadingRepository for PgStore {
    async fn record(&self, new_reading: NewReading) -> Result<Option<Reading>, DBError> {
        Ok(reading::insert(&self.conn, &new_reading)
            .await?
            .map(Reading::from))
    }

    async fn latest(&self, sensor_id: i32) -> Result<Option<Reading>, DBError> {
        Ok(reading::get_latest(&self.conn, sensor_id)
            .await?
            .map(Reading::from))
    }

    async fn between(
        &self,
        sensor_id: i32,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Reading>, DBError> {
        let mut daos = reading::get(&self.conn, sensor_id, from, until).await?;
        Ok(daos.drain(..).map(Reading::from).collect())
    }
}

pub mod plant;
pub mod reading;
pub mod sensor;
