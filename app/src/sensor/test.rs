use super::*;
use crate::cache::memory::MemoryKeyValueStore;
use crate::error::DBError;
use crate::repository::memory::MemoryStore;
use crate::repository::{Plant, SensorRepository};
use chrono::{TimeZone, Utc};
use sprout_core::error::StateError;
use sprout_core::{ReadingPayload, SensorStatus};

const OWNER: i32 = 1;
const STRANGER: i32 = 2;

struct Harness {
    store: Arc<MemoryStore>,
    kv: Arc<MemoryKeyValueStore>,
    context: Arc<SensorContext>,
    registry: SensorRegistry,
    ingest: IngestOrchestrator,
    queries: ReadingQueries,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryKeyValueStore::new());
    let cache = Cache::new(kv.clone(), Duration::from_millis(250));
    let context = SensorContext::new(
        store.clone(),
        store.clone(),
        cache,
        ServiceSettings::default(),
    );
    Harness {
        registry: SensorRegistry::new(context.clone()),
        ingest: IngestOrchestrator::new(context.clone()),
        queries: ReadingQueries::new(context.clone()),
        store,
        kv,
        context,
    }
}

fn payload(temperature: i32) -> ReadingPayload {
    ReadingPayload {
        temperature,
        air_humidity: 55.5,
        soil_moisture: 40.0,
        light_intensity: Some(1200),
        electrical_conductivity: Some(1.4),
        timestamp: None,
    }
}

impl Harness {
    fn deadline(&self) -> Instant {
        self.context.deadline()
    }

    async fn assigned_sensor(&self, device_id: &str, plant_name: &str) -> (Sensor, Plant) {
        let sensor = self
            .registry
            .register(self.deadline(), OWNER, device_id, "Sensor", "soil")
            .await
            .unwrap();
        let plant = self.store.insert_plant(OWNER, plant_name);
        self.registry
            .assign(self.deadline(), sensor.id, plant.id, OWNER)
            .await
            .unwrap();
        (sensor, plant)
    }
}

#[tokio::test]
async fn test_register_assign_ingest_latest() {
    let h = harness();
    let (sensor, plant) = h.assigned_sensor("dev-a", "Basil").await;
    assert_eq!(sensor.status, SensorStatus::Inactive);
    assert_eq!(sensor.plant_id, None);

    let receipt = h
        .ingest
        .receive(h.deadline(), "dev-a", payload(21))
        .await
        .unwrap();
    assert_eq!(receipt.plant_id, plant.id);
    assert_eq!(receipt.plant_name.as_deref(), Some("Basil"));

    let latest = h
        .queries
        .latest(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap();
    assert_eq!(latest.id, receipt.reading_id);
    assert_eq!(latest.user_id, OWNER);
    assert_eq!(latest.plant_id, plant.id);
    assert_eq!(latest.temperature, 21);

    let stored = h.store.sensor_unchecked(sensor.id).unwrap();
    assert_eq!(stored.status, SensorStatus::Active);
    assert!(stored.last_connection.is_some());
    h.store.assert_links_consistent();
}

#[tokio::test]
async fn test_reassign_clears_old_plant() {
    let h = harness();
    let (sensor, first) = h.assigned_sensor("dev-b", "Basil").await;
    let second = h.store.insert_plant(OWNER, "Mint");

    h.registry
        .assign(h.deadline(), sensor.id, second.id, OWNER)
        .await
        .unwrap();

    assert_eq!(h.store.plant_unchecked(first.id).unwrap().sensor_id, None);
    assert_eq!(
        h.store.plant_unchecked(second.id).unwrap().sensor_id,
        Some(sensor.id)
    );
    assert_eq!(
        h.store.sensor_unchecked(sensor.id).unwrap().plant_id,
        Some(second.id)
    );
    h.store.assert_links_consistent();
}

#[tokio::test]
async fn test_latest_invalidated_by_write() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-c", "Basil").await;

    let mut older = payload(18);
    older.timestamp = Some(Utc::now() - chrono::Duration::minutes(1));
    h.ingest.receive(h.deadline(), "dev-c", older).await.unwrap();
    let first = h.queries.latest(h.deadline(), sensor.id, OWNER).await.unwrap();
    assert!(h.kv.contains(&keys_latest(sensor.id)));

    let receipt = h
        .ingest
        .receive(h.deadline(), "dev-c", payload(24))
        .await
        .unwrap();
    assert!(!h.kv.contains(&keys_latest(sensor.id)));

    let second = h.queries.latest(h.deadline(), sensor.id, OWNER).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.id, receipt.reading_id);
    assert_eq!(second.temperature, 24);
}

fn keys_latest(sensor_id: i32) -> String {
    crate::cache::keys::latest(sensor_id)
}

#[tokio::test]
async fn test_inactive_sensor_rejected() {
    let h = harness();
    h.registry
        .register(h.deadline(), OWNER, "dev-d", "Sensor", "soil")
        .await
        .unwrap();

    let err = h
        .ingest
        .receive(h.deadline(), "dev-d", payload(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::State(StateError::SensorInactive(_))));
    assert_eq!(h.store.reading_count(), 0);
}

#[tokio::test]
async fn test_active_sensor_without_plant_rejected() {
    let h = harness();
    let sensor = h
        .registry
        .register(h.deadline(), OWNER, "dev-e", "Sensor", "soil")
        .await
        .unwrap();
    h.store.corrupt_sensor(sensor.id, SensorStatus::Active, None);

    let err = h
        .ingest
        .receive(h.deadline(), "dev-e", payload(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::State(StateError::UnassignedSensor(_))));
    assert_eq!(h.store.reading_count(), 0);
}

#[tokio::test]
async fn test_unknown_device() {
    let h = harness();
    let err = h
        .ingest
        .receive(h.deadline(), "ghost", payload(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidDevice(device) if device == "ghost"));
}

#[tokio::test]
async fn test_validation_before_write() {
    let h = harness();
    h.assigned_sensor("dev-f", "Basil").await;

    let err = h
        .ingest
        .receive(h.deadline(), "dev-f", payload(-21))
        .await
        .unwrap_err();
    match err {
        ServiceError::Validation(e) => assert_eq!(e.field(), "temperature"),
        other => panic!("unexpected error: {:?}", other),
    }

    let mut wet = payload(20);
    wet.soil_moisture = 100.01;
    let err = h.ingest.receive(h.deadline(), "dev-f", wet).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(e) if e.field() == "soil_moisture"));
    assert_eq!(h.store.reading_count(), 0);

    let mut edge = payload(-20);
    edge.soil_moisture = 100.0;
    h.ingest.receive(h.deadline(), "dev-f", edge).await.unwrap();
    assert_eq!(h.store.reading_count(), 1);
}

#[tokio::test]
async fn test_future_timestamp_rejected() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-z", "Basil").await;
    let current = h
        .ingest
        .receive(h.deadline(), "dev-z", payload(20))
        .await
        .unwrap();

    let mut ahead = payload(30);
    ahead.timestamp = Some(Utc::now() + chrono::Duration::days(1));
    let err = h
        .ingest
        .receive(h.deadline(), "dev-z", ahead)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(e) if e.field() == "timestamp"));
    assert_eq!(h.store.reading_count(), 1);

    let later = h
        .ingest
        .receive(h.deadline(), "dev-z", payload(25))
        .await
        .unwrap();
    let latest = h
        .queries
        .latest(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap();
    assert_ne!(latest.id, current.reading_id);
    assert_eq!(latest.id, later.reading_id);
}

#[tokio::test]
async fn test_register_rules() {
    let h = harness();
    h.registry
        .register(h.deadline(), OWNER, "dev-g", "Sensor", "soil")
        .await
        .unwrap();

    let err = h
        .registry
        .register(h.deadline(), STRANGER, "dev-g", "Other", "soil")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateDevice(_)));

    let err = h
        .registry
        .register(h.deadline(), OWNER, "  ", "Blank", "soil")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(e) if e.field() == "device_id"));
}

#[tokio::test]
async fn test_ownership() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-h", "Basil").await;
    let foreign_plant = h.store.insert_plant(STRANGER, "Fern");

    let err = h
        .queries
        .latest(h.deadline(), sensor.id, STRANGER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(Resource::Sensor)));

    let err = h
        .registry
        .assign(h.deadline(), sensor.id, foreign_plant.id, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(Resource::Plant)));

    let err = h
        .registry
        .assign(h.deadline(), sensor.id, 999, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Resource::Plant)));

    let err = h
        .registry
        .sensor(h.deadline(), 999, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Resource::Sensor)));
}

#[tokio::test]
async fn test_occupied_plant_rejected() {
    let h = harness();
    let (_, plant) = h.assigned_sensor("dev-i", "Basil").await;
    let other = h
        .registry
        .register(h.deadline(), OWNER, "dev-j", "Sensor", "soil")
        .await
        .unwrap();

    let err = h
        .registry
        .assign(h.deadline(), other.id, plant.id, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    h.store.assert_links_consistent();
}

#[tokio::test]
async fn test_stale_assignment_loses() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-k", "Basil").await;
    let second = h.store.insert_plant(OWNER, "Mint");

    // Writer that still believes the sensor is unassigned
    let err = h
        .store
        .assign(sensor.id, None, second.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DBError::Conflict(id) if id == sensor.id));
    assert!(matches!(
        ServiceError::storage("assign_sensor", err),
        ServiceError::Conflict(_)
    ));
    h.store.assert_links_consistent();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assignments_keep_links() {
    let h = harness();
    let sensor = h
        .registry
        .register(h.deadline(), OWNER, "dev-l", "Sensor", "soil")
        .await
        .unwrap();
    let plants: Vec<Plant> = (0..4)
        .map(|i| h.store.insert_plant(OWNER, &format!("Plant {}", i)))
        .collect();

    let mut tasks = Vec::new();
    for plant in &plants {
        let registry = h.registry.clone();
        let deadline = h.deadline();
        let (sensor_id, plant_id) = (sensor.id, plant.id);
        tasks.push(tokio::spawn(async move {
            registry.assign(deadline, sensor_id, plant_id, OWNER).await
        }));
    }
    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(ServiceError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert!(succeeded >= 1);
    h.store.assert_links_consistent();
    let linked = plants
        .iter()
        .filter(|plant| h.store.plant_unchecked(plant.id).unwrap().sensor_id.is_some())
        .count();
    assert_eq!(linked, 1);
}

#[tokio::test]
async fn test_maintenance_cycle() {
    let h = harness();
    let (sensor, plant) = h.assigned_sensor("dev-m", "Basil").await;

    h.registry
        .start_maintenance(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap();
    let stored = h.store.sensor_unchecked(sensor.id).unwrap();
    assert_eq!(stored.status, SensorStatus::Maintenance);
    assert_eq!(stored.plant_id, Some(plant.id));

    let err = h
        .registry
        .assign(h.deadline(), sensor.id, plant.id, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::State(StateError::InvalidTransition(
            SensorStatus::Maintenance,
            SensorStatus::Active
        ))
    ));
    let err = h
        .ingest
        .receive(h.deadline(), "dev-m", payload(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::State(StateError::SensorInactive(_))));

    h.registry
        .unassign(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap();
    let stored = h.store.sensor_unchecked(sensor.id).unwrap();
    assert_eq!(stored.status, SensorStatus::Inactive);
    assert_eq!(stored.plant_id, None);
    assert_eq!(h.store.plant_unchecked(plant.id).unwrap().sensor_id, None);
    h.store.assert_links_consistent();

    // Already unassigned
    h.registry
        .unassign(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_daily_average_is_cached() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-n", "Basil").await;
    for temperature in [10, 20, 30] {
        h.ingest
            .receive(h.deadline(), "dev-n", payload(temperature))
            .await
            .unwrap();
    }
    let date = h.queries.today();

    let first = h
        .queries
        .daily_average(h.deadline(), sensor.id, date, OWNER)
        .await
        .unwrap();
    let hits = h.context.cache_stats().hits;
    let second = h
        .queries
        .daily_average(h.deadline(), sensor.id, date, OWNER)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.context.cache_stats().hits, hits + 1);
    assert_eq!(first.reading_count, 3);
    assert_eq!(first.temperature.avg, 20.0);
    assert_eq!(first.temperature.min, 10.0);
    assert_eq!(first.temperature.max, 30.0);
}

#[tokio::test]
async fn test_daily_average_follows_writes() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-o", "Basil").await;
    let date = h.queries.today();

    let err = h
        .queries
        .daily_average(h.deadline(), sensor.id, date, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Resource::Aggregate)));
    assert!(h
        .queries
        .daily_readings(h.deadline(), sensor.id, date, OWNER)
        .await
        .unwrap()
        .is_empty());

    h.ingest.receive(h.deadline(), "dev-o", payload(10)).await.unwrap();
    let aggregate = h
        .queries
        .daily_average(h.deadline(), sensor.id, date, OWNER)
        .await
        .unwrap();
    assert_eq!(aggregate.reading_count, 1);

    h.ingest.receive(h.deadline(), "dev-o", payload(20)).await.unwrap();
    let aggregate = h
        .queries
        .daily_average(h.deadline(), sensor.id, date, OWNER)
        .await
        .unwrap();
    assert_eq!(aggregate.reading_count, 2);
    assert_eq!(aggregate.temperature.avg, 15.0);
}

#[tokio::test]
async fn test_backfilled_reading_invalidates_its_day() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-p", "Basil").await;
    let yesterday = h.queries.today().pred_opt().unwrap();
    let noon = Utc.from_utc_datetime(&yesterday.and_hms_opt(12, 0, 0).unwrap());

    let mut backfill = payload(15);
    backfill.timestamp = Some(noon);
    h.ingest
        .receive(h.deadline(), "dev-p", backfill.clone())
        .await
        .unwrap();
    let day = h
        .queries
        .daily_readings(h.deadline(), sensor.id, yesterday, OWNER)
        .await
        .unwrap();
    assert_eq!(day.len(), 1);

    backfill.timestamp = Some(noon + chrono::Duration::minutes(5));
    h.ingest
        .receive(h.deadline(), "dev-p", backfill)
        .await
        .unwrap();
    let day = h
        .queries
        .daily_readings(h.deadline(), sensor.id, yesterday, OWNER)
        .await
        .unwrap();
    assert_eq!(day.len(), 2);
    assert!(day[0].timestamp < day[1].timestamp);
}

#[tokio::test]
async fn test_latest_not_cached_when_absent() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-q", "Basil").await;

    let err = h
        .queries
        .latest(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Resource::Reading)));
    assert!(!h.kv.contains(&keys_latest(sensor.id)));

    let receipt = h
        .ingest
        .receive(h.deadline(), "dev-q", payload(22))
        .await
        .unwrap();
    let latest = h.queries.latest(h.deadline(), sensor.id, OWNER).await.unwrap();
    assert_eq!(latest.id, receipt.reading_id);
}

#[tokio::test]
async fn test_unreachable_cache_degrades() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-r", "Basil").await;
    h.kv.set_unreachable(true);

    let receipt = h
        .ingest
        .receive(h.deadline(), "dev-r", payload(19))
        .await
        .unwrap();
    let latest = h.queries.latest(h.deadline(), sensor.id, OWNER).await.unwrap();
    assert_eq!(latest.id, receipt.reading_id);
    let aggregate = h
        .queries
        .daily_average(h.deadline(), sensor.id, h.queries.today(), OWNER)
        .await
        .unwrap();
    assert_eq!(aggregate.reading_count, 1);

    let stats = h.context.cache_stats();
    assert_eq!(stats.hits, 0);
    assert!(stats.errors >= 4);
}

#[tokio::test]
async fn test_storage_failure() {
    let h = harness();
    let (sensor, _) = h.assigned_sensor("dev-s", "Basil").await;
    h.store.set_unavailable(true);

    let err = h
        .ingest
        .receive(h.deadline(), "dev-s", payload(20))
        .await
        .unwrap_err();
    assert!(err.is_internal());
    assert!(matches!(err, ServiceError::Storage("resolve_device", _)));

    let err = h
        .queries
        .latest(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Storage(..)));
}

#[tokio::test]
async fn test_sensor_count() {
    let h = harness();
    assert_eq!(h.context.sensor_count().await.unwrap(), 0);
    h.assigned_sensor("dev-t", "Basil").await;
    assert_eq!(h.context.sensor_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unassign_drops_cached_views() {
    let h = harness();
    let (sensor, plant) = h.assigned_sensor("dev-u", "Basil").await;
    h.ingest.receive(h.deadline(), "dev-u", payload(20)).await.unwrap();
    h.queries.latest(h.deadline(), sensor.id, OWNER).await.unwrap();
    h.queries
        .daily_average(h.deadline(), sensor.id, h.queries.today(), OWNER)
        .await
        .unwrap();
    assert!(h.kv.contains(&keys_latest(sensor.id)));

    h.registry
        .unassign(h.deadline(), sensor.id, OWNER)
        .await
        .unwrap();

    assert!(!h.kv.contains(&keys_latest(sensor.id)));
    assert!(!h.kv.contains(&crate::cache::keys::daily_average(
        sensor.id,
        h.queries.today()
    )));
    assert_eq!(h.store.plant_unchecked(plant.id).unwrap().sensor_id, None);
    h.store.assert_links_consistent();
}
