use crate::{
    error::FeedError,
    models::{ApiResponse, Simulation},
    services::FeedCoordinator,
};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SimulateQuery {
    #[serde(default)]
    pub amount: f64,
}

pub async fn simulate(
    State(coordinator): State<Arc<FeedCoordinator>>,
    Query(query): Query<SimulateQuery>,
) -> Result<Json<ApiResponse<Simulation>>, FeedError> {
    let simulation = coordinator.simulate(query.amount)?;
    Ok(Json(ApiResponse::ok(simulation)))
}
