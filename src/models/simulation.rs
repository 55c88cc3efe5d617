use crate::models::NetworkId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCost {
    pub network: NetworkId,
    pub block_number: u64,
    pub gas_cost_usd: f64,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub transfer_amount: f64,
    pub price_usd: f64,
    pub costs: Vec<NetworkCost>,
    pub cheapest: Option<NetworkId>,
}
