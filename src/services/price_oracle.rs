use crate::{
    config::PriceConfig,
    contracts::UniswapV3Pool,
    error::FeedError,
    models::PriceState,
    services::feed::FeedSignal,
};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use ethers::{
    contract::ContractError,
    providers::{Http, Middleware, Provider},
    types::{Address, U256},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait SwapSource: Send + Sync {
    // None when the pool saw no swap in the window
    async fn latest_sqrt_price_x96(&self, lookback_blocks: u64) -> Result<Option<U256>, FeedError>;
}

pub struct UniswapV3SwapSource {
    provider: Arc<Provider<Http>>,
    pool: UniswapV3Pool<Provider<Http>>,
}

impl UniswapV3SwapSource {
    pub fn new(rpc_url: &str, pool_address: Address) -> Result<Self, FeedError> {
        let provider = Arc::new(
            Provider::<Http>::try_from(rpc_url)
                .map_err(|e| FeedError::Config(format!("Invalid price RPC URL: {}", e)))?,
        );
        let pool = UniswapV3Pool::new(pool_address, provider.clone());
        Ok(Self { provider, pool })
    }
}

#[async_trait]
impl SwapSource for UniswapV3SwapSource {
    async fn latest_sqrt_price_x96(&self, lookback_blocks: u64) -> Result<Option<U256>, FeedError> {
        let current = self.provider.get_block_number().await?.as_u64();
        let from = current.saturating_sub(lookback_blocks);

        let swaps = self
            .pool
            .swap_filter()
            .from_block(from)
            .to_block(current)
            .query()
            .await
            .map_err(|e| match e {
                ContractError::ProviderError { .. } | ContractError::MiddlewareError { .. } => {
                    FeedError::Connection(e.to_string())
                }
                other => FeedError::Decode(other.to_string()),
            })?;

        Ok(swaps.last().map(|swap| swap.sqrt_price_x96))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDecoding {
    pub token0_decimals: u32,
    pub token1_decimals: u32,
    pub invert: bool,
}

impl From<&PriceConfig> for PriceDecoding {
    fn from(config: &PriceConfig) -> Self {
        Self {
            token0_decimals: config.token0_decimals,
            token1_decimals: config.token1_decimals,
            invert: config.invert,
        }
    }
}

impl PriceDecoding {
    /// Human price from a Q64.96 square-root price. `(sqrtP / 2^96)^2` is
    /// token1 per token0 in smallest units.
    pub fn decode(&self, sqrt_price_x96: U256) -> Result<f64, FeedError> {
        let sqrt = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
        let raw = sqrt * sqrt;
        let human = raw * 10f64.powi(self.token0_decimals as i32 - self.token1_decimals as i32);
        let price = if self.invert { 1.0 / human } else { human };

        if price.is_finite() && price > 0.0 {
            Ok(price)
        } else {
            Err(FeedError::Decode(format!(
                "sqrtPriceX96 {} decodes to unusable price {}",
                sqrt_price_x96, price
            )))
        }
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 2f64.powi(64) + *limb as f64)
}

pub type SharedPrice = Arc<ArcSwap<PriceState>>;

pub struct PriceOracle {
    source: Arc<dyn SwapSource>,
    decoding: PriceDecoding,
    lookback_blocks: u64,
    poll_interval: Duration,
    request_timeout: Duration,
    state: SharedPrice,
    signals: Option<mpsc::UnboundedSender<FeedSignal>>,
}

impl PriceOracle {
    pub fn new(source: Arc<dyn SwapSource>, config: &PriceConfig, state: SharedPrice) -> Self {
        Self {
            source,
            decoding: PriceDecoding::from(config),
            lookback_blocks: config.lookback_blocks,
            poll_interval: config.poll_interval,
            request_timeout: config.request_timeout,
            state,
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: mpsc::UnboundedSender<FeedSignal>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn current(&self) -> PriceState {
        **self.state.load()
    }

    pub async fn refresh(&self) -> Result<PriceState, FeedError> {
        let polled = timeout(self.request_timeout, self.source.latest_sqrt_price_x96(self.lookback_blocks))
            .await
            .unwrap_or(Err(FeedError::Timeout(self.request_timeout)));

        let result = match polled {
            Ok(Some(sqrt_price_x96)) => self.decoding.decode(sqrt_price_x96),
            Ok(None) => Err(FeedError::Decode(format!(
                "no swaps in the last {} blocks",
                self.lookback_blocks
            ))),
            Err(e) => Err(e),
        };

        match result {
            Ok(usd) => {
                let price = PriceState::observed(usd);
                self.state.store(Arc::new(price));
                tracing::info!(price_usd = %format!("{:.2}", usd), "Reference price updated");
                if let Some(signals) = &self.signals {
                    let _ = signals.send(FeedSignal::Price(price));
                }
                Ok(price)
            }
            Err(e) => {
                let kept = self.current();
                tracing::warn!(
                    error = %e,
                    kept_price = kept.usd_per_base_asset,
                    "Price refresh failed, keeping last known price"
                );
                Err(e)
            }
        }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // an in-flight poll must not hold up shutdown
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.refresh() => {}
                    }
                }
            }
        }

        tracing::info!("Price oracle stopped");
    }
}
