use super::*;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct MemoryState {
    sensors: BTreeMap<i32, Sensor>,
    plants: BTreeMap<i32, Plant>,
    readings: Vec<Reading>,
    next_sensor_id: i32,
    next_plant_id: i32,
    next_reading_id: i64,
}

/// Repositories backed by process memory, enforcing the same guarded
/// updates as the PostgreSQL statements
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_plant(&self, user_id: i32, name: &str) -> Plant {
        let mut state = self.state.lock();
        state.next_plant_id += 1;
        let plant = Plant {
            id: state.next_plant_id,
            user_id,
            name: name.to_owned(),
            sensor_id: None,
        };
        state.plants.insert(plant.id, plant.clone());
        plant
    }

    pub fn plant_unchecked(&self, plant_id: i32) -> Option<Plant> {
        self.state.lock().plants.get(&plant_id).cloned()
    }

    pub fn sensor_unchecked(&self, sensor_id: i32) -> Option<Sensor> {
        self.state.lock().sensors.get(&sensor_id).cloned()
    }

    pub fn reading_count(&self) -> usize {
        self.state.lock().readings.len()
    }

    /// Forces a sensor into a state that bypasses the registry
    pub fn corrupt_sensor(&self, sensor_id: i32, status: SensorStatus, plant_id: Option<i32>) {
        if let Some(sensor) = self.state.lock().sensors.get_mut(&sensor_id) {
            sensor.status = status;
            sensor.plant_id = plant_id;
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every linked sensor is referenced back by exactly its plant
    pub fn assert_links_consistent(&self) {
        let state = self.state.lock();
        for sensor in state.sensors.values() {
            if let Some(plant_id) = sensor.plant_id {
                let plant = state.plants.get(&plant_id).unwrap();
                assert_eq!(plant.sensor_id, Some(sensor.id));
                let sharing = state
                    .sensors
                    .values()
                    .filter(|other| other.plant_id == Some(plant_id))
                    .count();
                assert_eq!(sharing, 1);
            }
        }
        for plant in state.plants.values() {
            if let Some(sensor_id) = plant.sensor_id {
                assert_eq!(state.sensors[&sensor_id].plant_id, Some(plant.id));
            }
        }
    }

    fn check_available(&self) -> Result<(), DBError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DBError::SQLError(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl SensorRepository for MemoryStore {
    async fn insert_sensor(&self, new_sensor: NewSensor) -> Result<Sensor, DBError> {
        self.check_available()?;
        let mut state = self.state.lock();
        if state
            .sensors
            .values()
            .any(|sensor| sensor.device_id == new_sensor.device_id)
        {
            return Err(DBError::DuplicateDevice(new_sensor.device_id));
        }

        state.next_sensor_id += 1;
        let sensor = Sensor {
            id: state.next_sensor_id,
            device_id: new_sensor.device_id,
            name: new_sensor.name,
            device_type: new_sensor.device_type,
            user_id: new_sensor.user_id,
            plant_id: None,
            status: SensorStatus::Inactive,
            last_connection: None,
            created_at: Utc::now(),
        };
        state.sensors.insert(sensor.id, sensor.clone());
        Ok(sensor)
    }

    async fn sensor(&self, sensor_id: i32) -> Result<Option<Sensor>, DBError> {
        self.check_available()?;
        Ok(self.sensor_unchecked(sensor_id))
    }

    async fn sensor_by_device(&self, device_id: &str) -> Result<Option<Sensor>, DBError> {
        self.check_available()?;
        let state = self.state.lock();
        Ok(state
            .sensors
            .values()
            .find(|sensor| sensor.device_id == device_id)
            .cloned())
    }

    async fn plant(&self, plant_id: i32) -> Result<Option<Plant>, DBError> {
        self.check_available()?;
        Ok(self.plant_unchecked(plant_id))
    }

    async fn assign(
        &self,
        sensor_id: i32,
        expected_plant: Option<i32>,
        plant_id: i32,
    ) -> Result<(), DBError> {
        self.check_available()?;
        let mut state = self.state.lock();
        match state.sensors.get(&sensor_id) {
            Some(sensor)
                if sensor.plant_id == expected_plant
                    && sensor.status != SensorStatus::Maintenance => {}
            _ => return Err(DBError::Conflict(sensor_id)),
        }
        match state.plants.get(&plant_id) {
            Some(plant) if plant.sensor_id.is_none() || plant.sensor_id == Some(sensor_id) => {}
            _ => return Err(DBError::PlantOccupied(plant_id)),
        }

        if let Some(previous) = expected_plant.filter(|previous| *previous != plant_id) {
            if let Some(plant) = state.plants.get_mut(&previous) {
                if plant.sensor_id == Some(sensor_id) {
                    plant.sensor_id = None;
                }
            }
        }
        if let Some(plant) = state.plants.get_mut(&plant_id) {
            plant.sensor_id = Some(sensor_id);
        }
        if let Some(sensor) = state.sensors.get_mut(&sensor_id) {
            sensor.plant_id = Some(plant_id);
            sensor.status = SensorStatus::Active;
        }
        Ok(())
    }

    async fn release(
        &self,
        sensor_id: i32,
        expected_plant: Option<i32>,
        from: SensorStatus,
    ) -> Result<(), DBError> {
        self.check_available()?;
        let mut state = self.state.lock();
        match state.sensors.get_mut(&sensor_id) {
            Some(sensor) if sensor.plant_id == expected_plant && sensor.status == from => {
                sensor.plant_id = None;
                sensor.status = SensorStatus::Inactive;
            }
            _ => return Err(DBError::Conflict(sensor_id)),
        }
        if let Some(previous) = expected_plant {
            if let Some(plant) = state.plants.get_mut(&previous) {
                if plant.sensor_id == Some(sensor_id) {
                    plant.sensor_id = None;
                }
            }
        }
        Ok(())
    }

    async fn set_status(
        &self,
        sensor_id: i32,
        from: SensorStatus,
        to: SensorStatus,
    ) -> Result<(), DBError> {
        self.check_available()?;
        let mut state = self.state.lock();
        match state.sensors.get_mut(&sensor_id) {
            Some(sensor) if sensor.status == from => {
                sensor.status = to;
                Ok(())
            }
            _ => Err(DBError::Conflict(sensor_id)),
        }
    }

    async fn sensor_count(&self) -> Result<i64, DBError> {
        self.check_available()?;
        Ok(self.state.lock().sensors.len() as i64)
    }
}

#[async_trait::async_trait]
impl ReadingRepository for MemoryStore {
    async fn record(&self, new_reading: NewReading) -> Result<Option<Reading>, DBError> {
        self.check_available()?;
        let mut state = self.state.lock();
        let (user_id, plant_id) = match state.sensors.get_mut(&new_reading.sensor_id) {
            Some(sensor) if sensor.status == SensorStatus::Active => match sensor.plant_id {
                Some(plant_id) => {
                    sensor.last_connection = Some(new_reading.received_at);
                    (sensor.user_id, plant_id)
                }
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        state.next_reading_id += 1;
        let metrics = new_reading.metrics;
        let reading = Reading {
            id: state.next_reading_id,
            sensor_id: new_reading.sensor_id,
            user_id,
            plant_id,
            temperature: metrics.temperature,
            air_humidity: metrics.air_humidity,
            soil_moisture: metrics.soil_moisture,
            light_intensity: metrics.light_intensity,
            electrical_conductivity: metrics.electrical_conductivity,
            timestamp: new_reading.timestamp,
            created_at: new_reading.received_at,
        };
        state.readings.push(reading.clone());
        Ok(Some(reading))
    }

    async fn latest(&self, sensor_id: i32) -> Result<Option<Reading>, DBError> {
        self.check_available()?;
        let state = self.state.lock();
        Ok(state
            .readings
            .iter()
            .filter(|reading| reading.sensor_id == sensor_id)
            .max_by_key(|reading| (reading.timestamp, reading.id))
            .cloned())
    }

    async fn between(
        &self,
        sensor_id: i32,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Reading>, DBError> {
        self.check_available()?;
        let state = self.state.lock();
        let mut readings: Vec<Reading> = state
            .readings
            .iter()
            .filter(|reading| {
                reading.sensor_id == sensor_id
                    && reading.timestamp >= from
                    && reading.timestamp < until
            })
            .cloned()
            .collect();
        readings.sort_by_key(|reading| (reading.timestamp, reading.id));
        Ok(readings)
    }
}
