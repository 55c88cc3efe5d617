pub mod feed;
pub mod health;
pub mod networks;
pub mod price;
pub mod simulate;

pub use feed::*;
pub use health::*;
pub use networks::*;
pub use price::*;
pub use simulate::*;

use crate::services::FeedCoordinator;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub fn router(coordinator: Arc<FeedCoordinator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/networks", get(list_networks))
        .route("/api/networks/:id", get(get_network))
        .route("/api/networks/:id/ohlc", get(get_ohlc))
        .route("/api/price", get(get_price))
        .route("/api/simulate", get(simulate))
        .route("/ws/feed", get(feed_websocket))
        .with_state(coordinator)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(CorsLayer::permissive())
}
