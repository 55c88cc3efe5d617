use crate::models::GasSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn ethereum() -> Self {
        Self::new("ethereum")
    }

    pub fn polygon() -> Self {
        Self::new("polygon")
    }

    pub fn arbitrum() -> Self {
        Self::new("arbitrum")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // ETHEREUM_WS_URL etc.
    pub fn env_prefix(&self) -> String {
        self.0.to_uppercase().replace('-', "_")
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NetworkId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Subscribed,
    Erroring,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Subscribed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkState {
    pub network: NetworkId,
    pub status: ConnectionStatus,
    pub latest: Option<GasSample>,
    pub history: Vec<GasSample>,
}
