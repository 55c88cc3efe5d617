use crate::models::NetworkId;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PRIORITY_FEE_WEI: u128 = 2_000_000_000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;
pub const DEFAULT_FALLBACK_PRICE_USD: f64 = 3000.0;

// Uniswap V3 USDC/WETH 0.05% pool
const DEFAULT_PRICE_POOL: &str = "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Standard,
    DualLayer,
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "standard" | "eip1559" => Ok(StrategyKind::Standard),
            "dual_layer" | "dual-layer" | "rollup" => Ok(StrategyKind::DualLayer),
            _ => bail!("Unknown normalization strategy: {}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub id: NetworkId,
    pub ws_url: String,
    pub strategy: StrategyKind,
    pub decimals: u32,
}

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub history_capacity: usize,
    pub connect_timeout: Duration,
    pub backoff: BackoffConfig,
    pub priority_fee_wei: u128,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            connect_timeout: Duration::from_secs(3),
            backoff: BackoffConfig::default(),
            priority_fee_wei: DEFAULT_PRIORITY_FEE_WEI,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub rpc_url: String,
    pub pool_address: Address,
    pub lookback_blocks: u64,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub fallback_usd: f64,
    pub token0_decimals: u32,
    pub token1_decimals: u32,
    // base asset is token1
    pub invert: bool,
}

#[derive(Debug, Clone)]
pub struct OhlcConfig {
    pub min_bars: usize,
    pub jitter: f64,
}

impl Default for OhlcConfig {
    fn default() -> Self {
        Self {
            min_bars: 10,
            jitter: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub networks: Vec<NetworkConfig>,
    pub feed: FeedConfig,
    pub price: PriceConfig,
    pub ohlc: OhlcConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let networks = std::env::var("NETWORKS")
            .unwrap_or_else(|_| "ethereum,polygon,arbitrum".to_string())
            .split(',')
            .filter(|id| !id.trim().is_empty())
            .map(|id| Self::parse_network(NetworkId::new(id)))
            .collect::<Result<Vec<_>>>()?;

        let config = Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_var("PORT", 8080)?,
            networks,

            feed: FeedConfig {
                history_capacity: Self::parse_var("HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY)?,
                connect_timeout: Duration::from_millis(Self::parse_var("CONNECT_TIMEOUT_MS", 3000)?),
                backoff: BackoffConfig {
                    base: Duration::from_millis(Self::parse_var("BACKOFF_BASE_MS", 1000)?),
                    max: Duration::from_millis(Self::parse_var("BACKOFF_MAX_MS", 30_000)?),
                    jitter: Self::parse_var("BACKOFF_JITTER", 0.2)?,
                },
                priority_fee_wei: Self::parse_var("PRIORITY_FEE_WEI", DEFAULT_PRIORITY_FEE_WEI)?,
            },

            price: PriceConfig {
                rpc_url: std::env::var("PRICE_RPC_URL")
                    .unwrap_or_else(|_| "https://ethereum-rpc.publicnode.com".to_string()),
                pool_address: Self::parse_address("PRICE_POOL_ADDRESS", DEFAULT_PRICE_POOL)?,
                lookback_blocks: Self::parse_var("PRICE_LOOKBACK_BLOCKS", 10)?,
                poll_interval: Duration::from_secs(Self::parse_var("PRICE_POLL_SECS", 30)?),
                request_timeout: Duration::from_millis(Self::parse_var("PRICE_TIMEOUT_MS", 10_000)?),
                fallback_usd: Self::parse_var("PRICE_FALLBACK_USD", DEFAULT_FALLBACK_PRICE_USD)?,
                token0_decimals: Self::parse_var("PRICE_TOKEN0_DECIMALS", 6)?,
                token1_decimals: Self::parse_var("PRICE_TOKEN1_DECIMALS", 18)?,
                invert: Self::parse_var("PRICE_INVERT", true)?,
            },

            ohlc: OhlcConfig {
                min_bars: Self::parse_var("OHLC_MIN_BARS", 10)?,
                jitter: Self::parse_var("OHLC_JITTER", 0.05)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_network(id: NetworkId) -> Result<NetworkConfig> {
        let prefix = id.env_prefix();
        let ws_url = std::env::var(format!("{}_WS_URL", prefix))
            .ok()
            .or_else(|| Self::default_ws_url(&id).map(str::to_string))
            .with_context(|| format!("{}_WS_URL required for network {}", prefix, id))?;

        let default_strategy = if id == NetworkId::arbitrum() {
            "dual_layer"
        } else {
            "standard"
        };
        let strategy = std::env::var(format!("{}_STRATEGY", prefix))
            .unwrap_or_else(|_| default_strategy.to_string())
            .parse()
            .with_context(|| format!("Invalid {}_STRATEGY", prefix))?;

        Ok(NetworkConfig {
            decimals: Self::parse_var(&format!("{}_DECIMALS", prefix), 18)?,
            id,
            ws_url,
            strategy,
        })
    }

    fn default_ws_url(id: &NetworkId) -> Option<&'static str> {
        match id.as_str() {
            "ethereum" => Some("wss://ethereum-rpc.publicnode.com"),
            "polygon" => Some("wss://polygon-bor-rpc.publicnode.com"),
            "arbitrum" => Some("wss://arbitrum-one-rpc.publicnode.com"),
            _ => None,
        }
    }

    fn parse_var<T>(var: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(var) {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}", var)),
            Err(_) => Ok(default),
        }
    }

    fn parse_address(var: &str, default: &str) -> Result<Address> {
        let addr_str = std::env::var(var).unwrap_or_else(|_| default.to_string());
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("NETWORKS must name at least one network");
        }
        for network in &self.networks {
            if !network.ws_url.starts_with("ws") {
                bail!("{}_WS_URL must be a WS(S) URL", network.id.env_prefix());
            }
        }
        if !self.price.rpc_url.starts_with("http") {
            bail!("PRICE_RPC_URL must be HTTP(S) URL");
        }
        if self.feed.history_capacity == 0 {
            bail!("HISTORY_CAPACITY must be positive");
        }
        if !(self.price.fallback_usd.is_finite() && self.price.fallback_usd > 0.0) {
            bail!("PRICE_FALLBACK_USD must be a positive number");
        }
        if self.feed.backoff.base > self.feed.backoff.max {
            bail!("BACKOFF_BASE_MS must not exceed BACKOFF_MAX_MS");
        }

        tracing::info!(
            networks = ?self.networks.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            "Configuration validated"
        );

        Ok(())
    }
}
