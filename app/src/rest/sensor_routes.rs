use super::{build_response, build_response_with, user_id};
use crate::sensor::{SensorContext, SensorRegistry};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

pub fn routes(
    context: &Arc<SensorContext>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let registry = SensorRegistry::new(context.clone());
    register_sensor(registry.clone())
        .or(sensor(registry.clone()))
        .or(assign_sensor(registry.clone()))
        .or(unassign_sensor(registry.clone()))
        .or(start_maintenance(registry))
}

/// POST /sensors/register
///
/// Registers a device for the calling user
///
/// The sensor starts inactive and without plant
#[utoipa::path(
    post,
    path = "/sensors/register",
    tag = "sensors",
    request_body = dto::RegisterRequestDto,
    params(("X-User-Id" = i32, Header, description = "Owning user")),
    responses(
        (status = 201, description = "Sensor registered", body = sprout_core::Sensor),
        (status = 409, description = "Device id already registered", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn register_sensor(
    registry: SensorRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || registry.clone())
        .and(warp::path!("sensors" / "register"))
        .and(warp::post())
        .and(user_id())
        .and(warp::body::content_length_limit(4 * 1024))
        .and(warp::body::json())
        .and_then(
            |registry: SensorRegistry, user_id: i32, body: dto::RegisterRequestDto| async move {
                let resp = registry
                    .register(
                        registry.deadline(),
                        user_id,
                        &body.device_id,
                        &body.name,
                        &body.device_type,
                    )
                    .await;
                build_response_with(StatusCode::CREATED, resp)
            },
        )
        .boxed()
}

/// GET /sensors/:id
#[utoipa::path(
    get,
    path = "/sensors/{id}",
    tag = "sensors",
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "The sensor", body = sprout_core::Sensor),
        (status = 403, description = "Owned by another user", body = crate::rest::ErrorResponseDto),
        (status = 404, description = "Unknown sensor", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn sensor(
    registry: SensorRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || registry.clone())
        .and(warp::path!("sensors" / i32))
        .and(warp::get())
        .and(user_id())
        .and_then(
            |registry: SensorRegistry, sensor_id: i32, user_id: i32| async move {
                let resp = registry
                    .sensor(registry.deadline(), sensor_id, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

/// POST /sensors/:id/assign
///
/// Binds the sensor to a plant of the same user and activates it.
/// A previous plant is released in the same transaction.
#[utoipa::path(
    post,
    path = "/sensors/{id}/assign",
    tag = "sensors",
    request_body = dto::AssignRequestDto,
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "Sensor assigned"),
        (status = 400, description = "Sensor in maintenance", body = crate::rest::ErrorResponseDto),
        (status = 409, description = "Concurrent change or plant taken", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn assign_sensor(
    registry: SensorRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || registry.clone())
        .and(warp::path!("sensors" / i32 / "assign"))
        .and(warp::post())
        .and(user_id())
        .and(warp::body::content_length_limit(1024))
        .and(warp::body::json())
        .and_then(
            |registry: SensorRegistry,
             sensor_id: i32,
             user_id: i32,
             body: dto::AssignRequestDto| async move {
                let resp = registry
                    .assign(registry.deadline(), sensor_id, body.plant_id, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

/// POST /sensors/:id/unassign
///
/// Releases the plant and deactivates the sensor, also resets a sensor
/// out of maintenance
#[utoipa::path(
    post,
    path = "/sensors/{id}/unassign",
    tag = "sensors",
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "Sensor unassigned"),
        (status = 409, description = "Concurrent change", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn unassign_sensor(
    registry: SensorRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || registry.clone())
        .and(warp::path!("sensors" / i32 / "unassign"))
        .and(warp::post())
        .and(user_id())
        .and_then(
            |registry: SensorRegistry, sensor_id: i32, user_id: i32| async move {
                let resp = registry
                    .unassign(registry.deadline(), sensor_id, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

/// POST /sensors/:id/maintenance
#[utoipa::path(
    post,
    path = "/sensors/{id}/maintenance",
    tag = "sensors",
    params(
        ("id" = i32, Path, description = "Sensor id"),
        ("X-User-Id" = i32, Header, description = "Owning user"),
    ),
    responses(
        (status = 200, description = "Sensor in maintenance"),
        (status = 400, description = "Already in maintenance", body = crate::rest::ErrorResponseDto),
    )
)]
pub fn start_maintenance(
    registry: SensorRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || registry.clone())
        .and(warp::path!("sensors" / i32 / "maintenance"))
        .and(warp::post())
        .and(user_id())
        .and_then(
            |registry: SensorRegistry, sensor_id: i32, user_id: i32| async move {
                let resp = registry
                    .start_maintenance(registry.deadline(), sensor_id, user_id)
                    .await;
                build_response(resp)
            },
        )
        .boxed()
}

///
/// DTO
///
pub mod dto {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
    pub struct RegisterRequestDto {
        pub device_id: String,
        pub device_type: String,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
    pub struct AssignRequestDto {
        pub plant_id: i32,
    }
}
