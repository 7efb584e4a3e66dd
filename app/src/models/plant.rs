use crate::error::DBError;
use crate::repository::Plant;

#[derive(sqlx::FromRow, Debug)]
pub struct PlantDao {
    pub(crate) id: i32,
    pub(crate) user_id: i32,
    pub(crate) name: String,
    pub(crate) sensor_id: Option<i32>,
}

impl From<PlantDao> for Plant {
    fn from(val: PlantDao) -> Self {
        Plant {
            id: val.id,
            user_id: val.user_id,
            name: val.name,
            sensor_id: val.sensor_id,
        }
    }
}

// READ plants
pub async fn get(conn: &sqlx::PgPool, plant_id: i32) -> Result<Option<PlantDao>, DBError> {
    Ok(sql_stmnt!(
        PlantDao,
        "SELECT id, user_id, name, sensor_id FROM plants WHERE id = $1",
        plant_id
    )
    .fetch_optional(conn)
    .await?)
}
