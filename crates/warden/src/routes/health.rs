//! Health endpoint.

use axum::{Json, extract::State};
use serde::Serialize;
use warden_common::{Namespace, StorageBackend};

use crate::state::AppState;
use crate::store::topology::Node;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    storage: StorageBackend,
    /// Live challenges in the local fallback tier
    challenges: usize,
    /// Live sessions in the local fallback tier
    sessions: usize,
    redis_connected: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<Node>,
    config: HealthConfig,
}

#[derive(Serialize)]
struct HealthConfig {
    difficulty: u8,
    challenge_ttl: u64,
    session_ttl: u64,
    redis_enabled: bool,
    redis_nodes: Vec<String>,
}

/// Storage tier, fallback occupancy, and effective configuration.
/// Reads cached health state only; never touches the network.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage = state.store.backend().await;
    let redis_connected = storage == StorageBackend::Remote;

    let nodes = match state.store.tracker() {
        Some(tracker) => tracker
            .snapshot()
            .await
            .topology
            .map(|t| t.nodes)
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let status = if state.config.storage.enabled && !redis_connected {
        "degraded"
    } else {
        "ok"
    };

    let local = state.store.local();
    Json(HealthResponse {
        status,
        storage,
        challenges: local.len(Namespace::Challenge).await,
        sessions: local.len(Namespace::Session).await,
        redis_connected,
        nodes,
        config: HealthConfig {
            difficulty: state.difficulty.value(),
            challenge_ttl: state.config.challenge.ttl_secs,
            session_ttl: state.config.session.ttl_secs,
            redis_enabled: state.config.storage.enabled,
            redis_nodes: state.config.storage.nodes.clone(),
        },
    })
}
