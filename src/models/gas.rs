use crate::models::NetworkId;
use serde::{Deserialize, Serialize};

pub const WEI_PER_GWEI: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFees {
    pub number: u64,
    pub timestamp_secs: u64,
    pub base_fee_per_gas: Option<u128>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualLayerEstimate {
    pub l2_gas_estimate: u64,
    pub l2_base_fee: u128,
    pub l1_gas_estimate: u64,
    pub l1_base_fee_estimate: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerCosts {
    pub l1_gas_estimate: u64,
    pub l1_base_fee: u128,
    pub l1_cost: u128,
    pub l2_gas_estimate: u64,
    pub l2_base_fee: u128,
    pub l2_cost: u128,
}

impl LayerCosts {
    pub fn total(&self) -> u128 {
        self.l1_cost.saturating_add(self.l2_cost)
    }
}

// Fallback: the network's own estimator failed and a substitute formula was used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleConfidence {
    Exact,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasSample {
    pub network: NetworkId,
    pub timestamp_ms: u64,
    pub block_number: u64,
    pub base_fee: u128,
    pub priority_fee: u128,
    pub effective_gas_price: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<LayerCosts>,
    pub confidence: SampleConfidence,
}

impl GasSample {
    pub fn price(&self) -> f64 {
        self.effective_gas_price as f64
    }

    pub fn effective_gas_price_gwei(&self) -> f64 {
        self.effective_gas_price as f64 / WEI_PER_GWEI
    }
}
