use crate::{
    models::{ApiResponse, PriceState},
    services::FeedCoordinator,
};
use axum::{extract::State, Json};
use std::sync::Arc;

pub async fn get_price(State(coordinator): State<Arc<FeedCoordinator>>) -> Json<ApiResponse<PriceState>> {
    Json(ApiResponse::ok(coordinator.price()))
}
