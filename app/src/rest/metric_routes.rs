use super::build_response;
use crate::sensor::SensorContext;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    context: &Arc<SensorContext>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    health(context.clone())
}

/// GET /api/health
///
/// Reachability of the database and cache counters. Always answers 200,
/// `healthy` turns false if the database is gone.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "metrics",
    responses((status = 200, description = "Service state", body = dto::HealthyDto))
)]
pub fn health(
    context: Arc<SensorContext>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || context.clone())
        .and(warp::path!("api" / "health"))
        .and(warp::get())
        .and_then(|context: Arc<SensorContext>| async move {
            let (database_state, sensor_count) = match context.sensor_count().await {
                Ok(count) => ("connected".to_owned(), Some(count)),
                Err(e) => (e.to_string(), None),
            };
            let ret = dto::HealthyDto {
                healthy: sensor_count.is_some(),
                database_state,
                sensor_count,
                cache: context.cache_stats(),
            };
            build_response(Ok(ret))
        })
        .boxed()
}

pub mod dto {
    use crate::cache::CacheStats;
    use serde::Serialize;

    #[derive(Debug, Serialize, utoipa::ToSchema)]
    pub struct HealthyDto {
        pub healthy: bool,
        pub database_state: String,
        pub sensor_count: Option<i64>,
        pub cache: CacheStats,
    }
}
