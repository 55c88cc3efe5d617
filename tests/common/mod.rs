#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, U256};
use futures::StreamExt;
use gas_feed::{
    config::{BackoffConfig, Config, FeedConfig, NetworkConfig, OhlcConfig, PriceConfig, StrategyKind},
    error::FeedError,
    models::{BlockFees, DualLayerEstimate, NetworkId},
    services::{ChainClient, ChainConnector, FeedCoordinator, HeadStream, SwapSource},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PRIORITY_FEE: u128 = 2;

/// In-memory network: heads are pushed through `heads`, block base fees
/// come from the `base_fees` table.
pub struct FakeChain {
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<u64>>>>,
    base_fees: Arc<Mutex<HashMap<u64, u128>>>,
    refuse: bool,
}

pub struct FakeChainHandle {
    pub heads: mpsc::UnboundedSender<u64>,
    base_fees: Arc<Mutex<HashMap<u64, u128>>>,
}

impl FakeChainHandle {
    /// Registers the block's base fee, then announces it as a new head.
    pub fn mine(&self, number: u64, base_fee: u128) {
        self.base_fees.lock().unwrap().insert(number, base_fee);
        self.heads.send(number).unwrap();
    }
}

impl FakeChain {
    pub fn new() -> (Arc<Self>, FakeChainHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let base_fees = Arc::new(Mutex::new(HashMap::new()));
        let chain = Arc::new(Self {
            receiver: Arc::new(Mutex::new(Some(rx))),
            base_fees: base_fees.clone(),
            refuse: false,
        });
        (chain, FakeChainHandle { heads: tx, base_fees })
    }

    /// A network whose endpoint never accepts connections.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            receiver: Arc::new(Mutex::new(None)),
            base_fees: Arc::new(Mutex::new(HashMap::new())),
            refuse: true,
        })
    }
}

struct FakeClient {
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<u64>>>>,
    base_fees: Arc<Mutex<HashMap<u64, u128>>>,
}

#[async_trait]
impl ChainConnector for FakeChain {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
        if self.refuse {
            return Err(FeedError::Connection("connection refused".into()));
        }
        Ok(Arc::new(FakeClient {
            receiver: self.receiver.clone(),
            base_fees: self.base_fees.clone(),
        }))
    }
}

#[async_trait]
impl ChainClient for FakeClient {
    async fn subscribe_heads(&self) -> Result<HeadStream, FeedError> {
        let mut rx = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| FeedError::SubscriptionRejected("head source exhausted".into()))?;
        Ok(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).map(Ok::<u64, FeedError>).boxed())
    }

    async fn fetch_block(&self, number: u64) -> Result<BlockFees, FeedError> {
        let base_fee = self
            .base_fees
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .ok_or_else(|| FeedError::Decode(format!("block {} not found", number)))?;
        Ok(BlockFees {
            number,
            timestamp_secs: number * 12,
            base_fee_per_gas: Some(base_fee),
        })
    }

    async fn estimate_dual_layer(&self) -> Result<DualLayerEstimate, FeedError> {
        Err(FeedError::EstimatorUnavailable("not a rollup".into()))
    }
}

/// Reference pool returning a fixed swap, or failing when `None`.
pub struct FixedSwapSource(pub Option<U256>);

#[async_trait]
impl SwapSource for FixedSwapSource {
    async fn latest_sqrt_price_x96(&self, _lookback_blocks: u64) -> Result<Option<U256>, FeedError> {
        match self.0 {
            Some(price) => Ok(Some(price)),
            None => Err(FeedError::Connection("price rpc unreachable".into())),
        }
    }
}

/// sqrtPriceX96 of a USDC(6)/WETH(18) pool quoting `usd` per ETH.
pub fn sqrt_price_for(usd: f64) -> U256 {
    let raw = 1e12 / usd;
    U256::from((raw.sqrt() * 2f64.powi(96)) as u128)
}

pub fn test_config(networks: &[&str]) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        networks: networks
            .iter()
            .map(|id| NetworkConfig {
                id: NetworkId::new(id),
                ws_url: format!("ws://{}.invalid", id),
                strategy: StrategyKind::Standard,
                decimals: 18,
            })
            .collect(),
        feed: FeedConfig {
            history_capacity: 60,
            connect_timeout: Duration::from_millis(200),
            backoff: BackoffConfig {
                base: Duration::from_millis(10),
                max: Duration::from_millis(50),
                jitter: 0.0,
            },
            priority_fee_wei: PRIORITY_FEE,
        },
        price: PriceConfig {
            rpc_url: "http://localhost:8545".to_string(),
            pool_address: Address::zero(),
            lookback_blocks: 10,
            poll_interval: Duration::from_secs(3600),
            request_timeout: Duration::from_millis(500),
            fallback_usd: 3000.0,
            token0_decimals: 6,
            token1_decimals: 18,
            invert: true,
        },
        ohlc: OhlcConfig::default(),
    }
}

/// Reference pool whose RPC never answers.
pub struct StalledSwapSource;

#[async_trait]
impl SwapSource for StalledSwapSource {
    async fn latest_sqrt_price_x96(&self, _lookback_blocks: u64) -> Result<Option<U256>, FeedError> {
        std::future::pending().await
    }
}

/// Network whose handshake never completes.
pub struct HangingConnector;

#[async_trait]
impl ChainConnector for HangingConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
        std::future::pending().await
    }
}

/// Coordinator over the given fake chains, in the order given.
pub fn coordinator(chains: Vec<(&str, Arc<FakeChain>)>, price: Option<U256>) -> Arc<FeedCoordinator> {
    let chains = chains
        .into_iter()
        .map(|(id, chain)| (id, chain as Arc<dyn ChainConnector>))
        .collect();
    coordinator_with(chains, Arc::new(FixedSwapSource(price)))
}

pub fn coordinator_with(
    connectors: Vec<(&str, Arc<dyn ChainConnector>)>,
    source: Arc<dyn SwapSource>,
) -> Arc<FeedCoordinator> {
    let ids: Vec<&str> = connectors.iter().map(|(id, _)| *id).collect();
    let config = test_config(&ids);
    let mut connectors: HashMap<NetworkId, Arc<dyn ChainConnector>> = connectors
        .into_iter()
        .map(|(id, connector)| (NetworkId::new(id), connector))
        .collect();

    Arc::new(FeedCoordinator::with_upstreams(
        &config,
        |network| connectors.remove(&network.id).expect("connector for every network"),
        source,
    ))
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
