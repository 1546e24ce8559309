//! Instance registration, heartbeat and query handlers

use crate::api::rest::extract::ApiJson;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use meridian_registry::Registration;
use meridian_types::{
    InstanceId, InstanceRecord, Lease, RegisterRequest, ServiceInstances, ServiceName,
    StatusUpdate,
};
use serde::Deserialize;

/// Query parameters for snapshot requests
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Version the caller already holds; answered with 304 when current
    pub known_version: Option<u64>,
}

/// `PUT /instances/:service/:id`
pub async fn register_instance(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<StatusCode> {
    let registration = Registration {
        service: ServiceName::from(service),
        instance_id: InstanceId::from(id),
        host: body.host,
        port: body.port,
        secure: body.secure,
        status: body.status,
        metadata: body.metadata,
        lease_duration_secs: body.lease_duration_secs,
    };

    state.registry.register(registration).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /instances/:service/:id/renew`
pub async fn renew_instance(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
) -> ApiResult<Json<Lease>> {
    let lease = state
        .registry
        .renew(&ServiceName::from(service), &InstanceId::from(id))
        .await?;
    Ok(Json(lease))
}

/// `PUT /instances/:service/:id/status`
pub async fn set_instance_status(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
    ApiJson(body): ApiJson<StatusUpdate>,
) -> ApiResult<Json<InstanceRecord>> {
    let record = state
        .registry
        .set_status(&ServiceName::from(service), &InstanceId::from(id), body.status)
        .await?;
    Ok(Json(record))
}

/// `DELETE /instances/:service/:id`
pub async fn deregister_instance(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .registry
        .deregister(&ServiceName::from(service), &InstanceId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /instances/:service/:id`
pub async fn get_instance(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
) -> ApiResult<Json<InstanceRecord>> {
    let service = ServiceName::from(service);
    let id = InstanceId::from(id);

    // Through the snapshot so `lease_expired` is reported.
    let snapshot = state.registry.snapshot(Some(&service)).await;
    snapshot
        .service(&service)
        .and_then(|s| s.get(&id))
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{}/{}", service, id)))
}

/// `GET /instances`
pub async fn list_instances(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    let snapshot = state.registry.snapshot(None).await;
    if query.known_version == Some(snapshot.version) {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    Json(snapshot).into_response()
}

/// `GET /instances/:service`
///
/// A service with no live instances answers with an empty list.
pub async fn get_service_instances(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    let service = ServiceName::from(service);
    let snapshot = state.registry.snapshot(Some(&service)).await;
    if query.known_version == Some(snapshot.version) {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    Json(ServiceInstances::from_snapshot(service, &snapshot)).into_response()
}
