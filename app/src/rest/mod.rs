use crate::error::ServiceError;
use crate::sensor::SensorContext;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

mod data_routes;
mod doc_routes;
mod metric_routes;
mod query;
mod sensor_routes;


#[derive(OpenApi)]
#[openapi(
    paths(
        data_routes::receive_reading,
        data_routes::latest_reading,
        data_routes::daily_readings,
        data_routes::daily_average,
        sensor_routes::register_sensor,
        sensor_routes::sensor,
        sensor_routes::assign_sensor,
        sensor_routes::unassign_sensor,
        sensor_routes::start_maintenance,
        metric_routes::health,
    ),
    components(schemas(
        sprout_core::Sensor,
        sprout_core::SensorStatus,
        sprout_core::Reading,
        sprout_core::ReadingPayload,
        sprout_core::DailyAggregate,
        sprout_core::MetricSummary,
        crate::sensor::Receipt,
        crate::cache::CacheStats,
        data_routes::dto::SensorDataDto,
        sensor_routes::dto::RegisterRequestDto,
        sensor_routes::dto::AssignRequestDto,
        metric_routes::dto::HealthyDto,
        ErrorResponseDto,
    )),
    tags(
        (name = "device", description = "Telemetry sent by sensors"),
        (name = "sensors", description = "Sensor management and readings"),
        (name = "metrics", description = "Service state"),
    )
)]
pub struct ApiDoc;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponseDto {
    pub error: String,
}

/// Caller did not present a usable `X-User-Id`
#[derive(Debug)]
struct Unauthenticated;

impl warp::reject::Reject for Unauthenticated {}

/// Identity forwarded by the authenticating proxy
fn user_id() -> impl Filter<Extract = (i32,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-user-id").and_then(|raw: Option<String>| async move {
        raw.and_then(|raw| raw.trim().parse::<i32>().ok())
            .ok_or_else(|| warp::reject::custom(Unauthenticated))
    })
}

pub fn routes(
    context: &Arc<SensorContext>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    data_routes::routes(context)
        .or(sensor_routes::routes(context))
        .or(metric_routes::routes(context))
        .or(doc_routes::swagger(ApiDoc::openapi()))
        .recover(handle_rejection)
        .with(warp::trace(|info| {
            tracing::info_span!(
                "request",
                id = %uuid::Uuid::new_v4(),
                method = %info.method(),
                path = %info.path(),
            )
        }))
}

pub async fn dispatch_server_daemon(
    context: Arc<SensorContext>,
    port: u16,
) -> Result<(), warp::Error> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let (addr, server) =
        warp::serve(routes(&context)).try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down webserver");
        })?;

    info!("Starting webserver at: {}", addr);
    server.await;
    Ok(())
}

fn build_response<T: Serialize>(resp: Result<T, ServiceError>) -> Result<warp::reply::Response, Rejection> {
    build_response_with(StatusCode::OK, resp)
}

fn build_response_with<T: Serialize>(
    status: StatusCode,
    resp: Result<T, ServiceError>,
) -> Result<warp::reply::Response, Rejection> {
    match resp {
        Ok(data) => Ok(warp::reply::with_status(warp::reply::json(&data), status).into_response()),
        Err(err) => {
            let status = error_status(&err);
            let message = if err.is_internal() {
                // Already logged with its operation
                status
                    .canonical_reason()
                    .unwrap_or("Internal error")
                    .to_owned()
            } else {
                warn!("{}", err);
                err.to_string()
            };
            Ok(error_reply(status, message))
        }
    }
}

fn error_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidDevice(_) => StatusCode::UNAUTHORIZED,
        ServiceError::Validation(_) | ServiceError::State(_) => StatusCode::BAD_REQUEST,
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::DuplicateDevice(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Storage(..) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_reply(status: StatusCode, error: String) -> warp::reply::Response {
    let body = ErrorResponseDto { error };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_owned())
    } else if err.find::<Unauthenticated>().is_some() {
        (
            StatusCode::UNAUTHORIZED,
            "Missing or invalid X-User-Id header".to_owned(),
        )
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_owned())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_owned(),
        )
    };
    Ok(error_reply(status, message))
}
