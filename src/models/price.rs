use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Default,
    Oracle,
}

// usd_per_base_asset is always > 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceState {
    pub usd_per_base_asset: f64,
    pub last_updated: Option<DateTime<Utc>>,
    pub source: PriceSource,
}

impl PriceState {
    pub fn fallback(usd_per_base_asset: f64) -> Self {
        Self {
            usd_per_base_asset,
            last_updated: None,
            source: PriceSource::Default,
        }
    }

    pub fn observed(usd_per_base_asset: f64) -> Self {
        Self {
            usd_per_base_asset,
            last_updated: Some(Utc::now()),
            source: PriceSource::Oracle,
        }
    }
}
