use crate::models::{ConnectionStatus, NetworkId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NetworkHealth {
    pub network: NetworkId,
    pub status: ConnectionStatus,
    pub last_block: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub connected: bool,
    pub networks: Vec<NetworkHealth>,
    pub price_last_updated: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
