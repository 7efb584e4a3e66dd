use super::query::DateQuery;
use super::{build_response, user_id};
use crate::sensor::{IngestOrchestrator, ReadingQueries, SensorContext};
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    context: &Arc<SensorContext>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ingest = IngestOrchestrator::new(context.clone());
    let queries = ReadingQueries::new(context.clone());
    receive_reading(ingest)
        .or(latest_reading(queries.clone()))
        .or(daily_readings(queries.clone()))
        .or(daily_average(queries))
}

/// POST /sensors/data
///
/// Telemetry of a device, authenticated by its device id only
#[utoipa::path(
    post,
    path = "/sensors/data",
    tag = "device",
    request_body = dto::SensorDataDto,
    responses(
        (status = 200, description = "Reading stored", body = crate::sensor::Receipt),
        (status = 400, description = "Sensor inactive, unassigned or value out of range", body = crate::rest::ErrorResponseDto),
        (status = 401, description = "Unknown device", body = crate::rest::ErrorResponseDto),
        (status = 500, description = "Storage failure", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn receive_reading(
    ingest: IngestOrchestrator,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || ingest.clone())
        .and(warp::path!("sensors" / "data"))
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and_then(
            |ingest: IngestOrchestrator, body: dto::SensorDataDto| async move {
                let deadline = ingest.deadline();
                let resp = ingest
                    .receive(deadline, &body.device_id, body.payload)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

/// GET /sensors/:id/latest
///
/// Newest reading of a sensor
#[utoipa::path(
    get,
    path = "/sensors/{id}/latest",
    tag = "sensors",
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "Latest reading", body = sprout_core::Reading),
        (status = 404, description = "No reading recorded yet", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn latest_reading(
    queries: ReadingQueries,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || queries.clone())
        .and(warp::path!("sensors" / i32 / "latest"))
        .and(warp::get())
        .and(user_id())
        .and_then(
            |queries: ReadingQueries, sensor_id: i32, user_id: i32| async move {
                let resp = queries
                    .latest(queries.deadline(), sensor_id, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

/// GET /sensors/:id/daily?date=YYYY-MM-DD
///
/// All readings of one day, oldest first
#[utoipa::path(
    get,
    path = "/sensors/{id}/daily",
    tag = "sensors",
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("date" = Option<String>, Query, description = "Day as YYYY-MM-DD, defaults to today"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "Readings of the day", body = [sprout_core::Reading]),
    )
)]
pub fn daily_readings(
    queries: ReadingQueries,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || queries.clone())
        .and(warp::path!("sensors" / i32 / "daily"))
        .and(warp::get())
        .and(warp::query::<DateQuery>())
        .and(user_id())
        .and_then(
            |queries: ReadingQueries, sensor_id: i32, query: DateQuery, user_id: i32| async move {
                let date = query.date_or(queries.today());
                let resp = queries
                    .daily_readings(queries.deadline(), sensor_id, date, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

/// GET /sensors/:id/daily-avg?date=YYYY-MM-DD
///
/// Average, minimum and maximum of one day
#[utoipa::path(
    get,
    path = "/sensors/{id}/daily-avg",
    tag = "sensors",
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("date" = Option<String>, Query, description = "Day as YYYY-MM-DD, defaults to today"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "Statistics of the day", body = sprout_core::DailyAggregate),
        (status = 404, description = "Nothing recorded that day", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn daily_average(
    queries: ReadingQueries,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || queries.clone())
        .and(warp::path!("sensors" / i32 / "daily-avg"))
        .and(warp::get())
        .and(warp::query::<DateQuery>())
        .and(user_id())
        .and_then(
            |queries: ReadingQueries, sensor_id: i32, query: DateQuery, user_id: i32| async move {
                let date = query.date_or(queries.today());
                let resp = queries
                    .daily_average(queries.deadline(), sensor_id, date, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

pub mod dto {
    use serde::{Deserialize, Serialize};
    use sprout_core::ReadingPayload;

    #[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
    pub struct SensorDataDto {
        pub device_id: String,
        #[serde(flatten)]
        pub payload: ReadingPayload,
    }
}
