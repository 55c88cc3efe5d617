use crate::{
    error::FeedError,
    models::{ApiResponse, NetworkId, NetworkState, OhlcBar},
    services::FeedCoordinator,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

pub async fn list_networks(State(coordinator): State<Arc<FeedCoordinator>>) -> Json<ApiResponse<Vec<NetworkState>>> {
    Json(ApiResponse::ok(coordinator.snapshots()))
}

pub async fn get_network(
    State(coordinator): State<Arc<FeedCoordinator>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<NetworkState>>, FeedError> {
    let id = NetworkId::new(id);
    let state = coordinator
        .snapshot(&id)
        .ok_or_else(|| FeedError::UnknownNetwork(id.to_string()))?;
    Ok(Json(ApiResponse::ok(state)))
}

#[derive(Debug, Deserialize)]
pub struct OhlcQuery {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub backfill: bool,
}

fn default_interval_minutes() -> u64 {
    15
}

pub async fn get_ohlc(
    State(coordinator): State<Arc<FeedCoordinator>>,
    Path(id): Path<String>,
    Query(query): Query<OhlcQuery>,
) -> Result<Json<ApiResponse<Vec<OhlcBar>>>, FeedError> {
    let bars = coordinator.ohlc(&NetworkId::new(id), query.interval_minutes, query.backfill)?;
    Ok(Json(ApiResponse::ok(bars)))
}
