//! Health and info probes

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use meridian_replication::PeerHealth;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    /// Eviction currently suspended
    pub self_preservation: bool,
    pub registry_version: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "UP".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        self_preservation: state.registry.is_self_preserving(),
        registry_version: state.registry.version(),
    })
}

/// Peer entry in the info response
#[derive(Debug, Serialize)]
pub struct PeerInfo {
    pub url: String,
    #[serde(flatten)]
    pub health: PeerHealth,
}

/// Info response
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub peers: Vec<PeerInfo>,
    pub config_backend: String,
    pub default_label: String,
}

/// Info endpoint
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let peers = state
        .replicator
        .as_ref()
        .map(|r| {
            r.peer_health()
                .into_iter()
                .map(|(url, health)| PeerInfo { url, health })
                .collect()
        })
        .unwrap_or_default();

    Json(InfoResponse {
        name: "meridian".to_string(),
        version: state.version.clone(),
        started_at: state.started_at,
        peers,
        config_backend: state.resolver.backend_kind().to_string(),
        default_label: state.resolver.config().default_label.clone(),
    })
}
