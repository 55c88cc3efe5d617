use crate::{
    config::StrategyKind,
    models::{BlockFees, DualLayerEstimate, GasSample, LayerCosts, NetworkId, SampleConfidence},
};

pub const STANDARD_TRANSFER_GAS: u64 = 21_000;

// 0.1 gwei
pub const FALLBACK_BASE_FEE_WEI: u128 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationStrategy {
    Standard { priority_fee: u128 },
    DualLayer { priority_fee: u128 },
}

impl NormalizationStrategy {
    pub fn new(kind: StrategyKind, priority_fee: u128) -> Self {
        match kind {
            StrategyKind::Standard => NormalizationStrategy::Standard { priority_fee },
            StrategyKind::DualLayer => NormalizationStrategy::DualLayer { priority_fee },
        }
    }

    pub fn needs_estimate(&self) -> bool {
        matches!(self, NormalizationStrategy::DualLayer { .. })
    }

    pub fn normalize(
        &self,
        network: &NetworkId,
        block: &BlockFees,
        estimate: Option<&DualLayerEstimate>,
    ) -> GasSample {
        match *self {
            NormalizationStrategy::Standard { priority_fee } => {
                standard_sample(network, block, block.base_fee_per_gas.unwrap_or(0), priority_fee)
            }
            NormalizationStrategy::DualLayer { priority_fee } => match estimate {
                Some(estimate) => dual_layer_sample(network, block, estimate, priority_fee),
                None => {
                    let base_fee = block
                        .base_fee_per_gas
                        .filter(|fee| *fee > 0)
                        .unwrap_or(FALLBACK_BASE_FEE_WEI);
                    tracing::debug!(
                        network = %network,
                        block = block.number,
                        base_fee,
                        "Dual-layer estimate unavailable, using single-layer fallback"
                    );
                    GasSample {
                        confidence: SampleConfidence::Fallback,
                        ..standard_sample(network, block, base_fee, priority_fee)
                    }
                }
            },
        }
    }
}

fn standard_sample(network: &NetworkId, block: &BlockFees, base_fee: u128, priority_fee: u128) -> GasSample {
    GasSample {
        network: network.clone(),
        timestamp_ms: block.timestamp_secs.saturating_mul(1000),
        block_number: block.number,
        base_fee,
        priority_fee,
        effective_gas_price: base_fee.saturating_add(priority_fee),
        layers: None,
        confidence: SampleConfidence::Exact,
    }
}

fn dual_layer_sample(
    network: &NetworkId,
    block: &BlockFees,
    estimate: &DualLayerEstimate,
    priority_fee: u128,
) -> GasSample {
    let layers = LayerCosts {
        l1_gas_estimate: estimate.l1_gas_estimate,
        l1_base_fee: estimate.l1_base_fee_estimate,
        l1_cost: (estimate.l1_gas_estimate as u128).saturating_mul(estimate.l1_base_fee_estimate),
        l2_gas_estimate: estimate.l2_gas_estimate,
        l2_base_fee: estimate.l2_base_fee,
        l2_cost: (estimate.l2_gas_estimate as u128).saturating_mul(estimate.l2_base_fee),
    };

    GasSample {
        network: network.clone(),
        timestamp_ms: block.timestamp_secs.saturating_mul(1000),
        block_number: block.number,
        base_fee: estimate.l2_base_fee,
        priority_fee,
        // truncating division
        effective_gas_price: layers.total() / STANDARD_TRANSFER_GAS as u128,
        layers: Some(layers),
        confidence: SampleConfidence::Exact,
    }
}
