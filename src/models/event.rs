use crate::models::{GasSample, NetworkId, PriceState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Sample { network: NetworkId, sample: GasSample },
    Price { price: PriceState },
    Connection { connected: bool },
}
