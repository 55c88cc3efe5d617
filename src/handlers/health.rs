use crate::{
    models::{HealthStatus, NetworkHealth},
    services::FeedCoordinator,
};
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

pub async fn health_check(State(coordinator): State<Arc<FeedCoordinator>>) -> Json<HealthStatus> {
    let networks: Vec<NetworkHealth> = coordinator
        .snapshots()
        .into_iter()
        .map(|state| NetworkHealth {
            network: state.network,
            status: state.status,
            last_block: state.latest.map(|sample| sample.block_number),
        })
        .collect();

    let subscribed = networks.iter().filter(|n| n.status.is_connected()).count();
    let status = if subscribed > 0 && subscribed == networks.len() {
        "healthy"
    } else if subscribed > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected: subscribed > 0,
        networks,
        price_last_updated: coordinator.last_updated(),
        uptime_seconds: coordinator.uptime().as_secs(),
        timestamp: Utc::now(),
    })
}
