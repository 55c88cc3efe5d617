use crate::{
    contracts::{NodeInterface, NODE_INTERFACE_ADDRESS},
    error::FeedError,
    models::{BlockFees, DualLayerEstimate, NetworkId},
};
use async_trait::async_trait;
use ethers::{
    providers::{Middleware, Provider, Ws},
    types::{Address, Bytes, U256},
};
use futures::{stream::BoxStream, StreamExt};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// ends, or yields a transport error, when the connection is lost
pub type HeadStream = BoxStream<'static, Result<u64, FeedError>>;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn subscribe_heads(&self) -> Result<HeadStream, FeedError>;

    async fn fetch_block(&self, number: u64) -> Result<BlockFees, FeedError>;

    async fn estimate_dual_layer(&self) -> Result<DualLayerEstimate, FeedError>;
}

#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError>;
}

pub struct WsConnector {
    network: NetworkId,
    ws_url: String,
}

impl WsConnector {
    pub fn new(network: NetworkId, ws_url: impl Into<String>) -> Self {
        Self {
            network,
            ws_url: ws_url.into(),
        }
    }
}

#[async_trait]
impl ChainConnector for WsConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
        let ws = Ws::connect(self.ws_url.as_str()).await?;
        let provider = Arc::new(Provider::new(ws));

        // handshake
        let chain_id = provider.get_chainid().await?;
        tracing::info!(network = %self.network, chain_id = %chain_id, "WebSocket connected");

        Ok(Arc::new(WsChainClient::new(self.network.clone(), provider)?))
    }
}

pub struct WsChainClient {
    network: NetworkId,
    provider: Arc<Provider<Ws>>,
    node_interface: NodeInterface<Provider<Ws>>,
}

impl WsChainClient {
    pub fn new(network: NetworkId, provider: Arc<Provider<Ws>>) -> Result<Self, FeedError> {
        let address = Address::from_str(NODE_INTERFACE_ADDRESS)
            .map_err(|e| FeedError::Config(format!("Invalid NodeInterface address: {}", e)))?;
        let node_interface = NodeInterface::new(address, provider.clone());

        Ok(Self {
            network,
            provider,
            node_interface,
        })
    }
}

#[async_trait]
impl ChainClient for WsChainClient {
    async fn subscribe_heads(&self) -> Result<HeadStream, FeedError> {
        let provider = self.provider.clone();
        let network = self.network.clone();
        let (head_tx, mut head_rx) = mpsc::channel::<Result<u64, FeedError>>(64);
        let (ready_tx, ready_rx) = oneshot::channel();

        // The subscription borrows the provider, so it lives in its own task
        // and forwards heads until either side goes away.
        tokio::spawn(async move {
            let mut stream = match provider.subscribe_blocks().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(FeedError::SubscriptionRejected(e.to_string())));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = head_tx.closed() => break,
                    block = stream.next() => {
                        let item = match block {
                            Some(block) => block
                                .number
                                .map(|n| n.as_u64())
                                .ok_or_else(|| FeedError::Decode("head without block number".into())),
                            None => {
                                let _ = head_tx
                                    .send(Err(FeedError::Connection("head subscription ended".into())))
                                    .await;
                                break;
                            }
                        };
                        if head_tx.send(item).await.is_err() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!(network = %network, "Head forwarder stopped");
        });

        ready_rx
            .await
            .map_err(|_| FeedError::Connection("subscription task aborted".into()))??;

        let heads = futures::stream::poll_fn(move |cx| head_rx.poll_recv(cx));
        Ok(heads.boxed())
    }

    async fn fetch_block(&self, number: u64) -> Result<BlockFees, FeedError> {
        let block = self
            .provider
            .get_block(number)
            .await?
            .ok_or_else(|| FeedError::Decode(format!("block {} not found", number)))?;

        Ok(BlockFees {
            number: block.number.map(|n| n.as_u64()).unwrap_or(number),
            timestamp_secs: u256_to_u64(block.timestamp, "timestamp")?,
            base_fee_per_gas: block
                .base_fee_per_gas
                .map(|fee| u256_to_u128(fee, "baseFeePerGas"))
                .transpose()?,
        })
    }

    async fn estimate_dual_layer(&self) -> Result<DualLayerEstimate, FeedError> {
        let (l2_gas_estimate, l1_gas_estimate, base_fee, l1_base_fee_estimate) = self
            .node_interface
            .gas_estimate_components(Address::zero(), false, Bytes::default())
            .call()
            .await
            .map_err(|e| FeedError::EstimatorUnavailable(e.to_string()))?;

        Ok(DualLayerEstimate {
            l2_gas_estimate,
            l2_base_fee: u256_to_u128(base_fee, "baseFee")?,
            l1_gas_estimate,
            l1_base_fee_estimate: u256_to_u128(l1_base_fee_estimate, "l1BaseFeeEstimate")?,
        })
    }
}

pub(crate) fn u256_to_u128(value: U256, field: &str) -> Result<u128, FeedError> {
    if value > U256::from(u128::MAX) {
        return Err(FeedError::Decode(format!("{} overflows u128: {}", field, value)));
    }
    Ok(value.as_u128())
}

fn u256_to_u64(value: U256, field: &str) -> Result<u64, FeedError> {
    if value > U256::from(u64::MAX) {
        return Err(FeedError::Decode(format!("{} overflows u64: {}", field, value)));
    }
    Ok(value.as_u64())
}
