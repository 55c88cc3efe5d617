use crate::{
    config::{Config, NetworkConfig},
    error::FeedError,
    models::{ConnectionStatus, FeedEvent, NetworkId, NetworkState, OhlcBar, PriceState, Simulation},
    services::{
        chain::{ChainConnector, WsConnector},
        feed::{ChainFeedManager, FeedSignal},
        history::HistoryStore,
        normalize::NormalizationStrategy,
        ohlc::{compute_ohlc, compute_ohlc_with_backfill, BackfillPolicy},
        price_oracle::{PriceOracle, SharedPrice, SwapSource, UniswapV3SwapSource},
        simulator,
    },
};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 1024;

struct ManagedNetwork {
    manager: Arc<ChainFeedManager>,
    decimals: u32,
}

/// Single entry point for every network feed and the price oracle.
pub struct FeedCoordinator {
    networks: Vec<ManagedNetwork>,
    store: Arc<HistoryStore>,
    price: SharedPrice,
    oracle: Arc<PriceOracle>,
    backfill: BackfillPolicy,
    events: broadcast::Sender<FeedEvent>,
    connected: Arc<watch::Sender<bool>>,
    signals: Mutex<Option<mpsc::UnboundedReceiver<FeedSignal>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
}

impl FeedCoordinator {
    pub fn from_config(config: &Config) -> Result<Self, FeedError> {
        let source = UniswapV3SwapSource::new(&config.price.rpc_url, config.price.pool_address)?;
        Ok(Self::with_upstreams(
            config,
            |network| Arc::new(WsConnector::new(network.id.clone(), network.ws_url.clone())),
            Arc::new(source),
        ))
    }

    pub fn with_upstreams<F>(config: &Config, mut connector_for: F, source: Arc<dyn SwapSource>) -> Self
    where
        F: FnMut(&NetworkConfig) -> Arc<dyn ChainConnector>,
    {
        let store = Arc::new(HistoryStore::new(config.feed.history_capacity));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let networks = config
            .networks
            .iter()
            .map(|network| {
                let strategy = NormalizationStrategy::new(network.strategy, config.feed.priority_fee_wei);
                let manager = ChainFeedManager::new(
                    network.id.clone(),
                    connector_for(network),
                    strategy,
                    store.clone(),
                    &config.feed,
                    signal_tx.clone(),
                );
                ManagedNetwork {
                    manager: Arc::new(manager),
                    decimals: network.decimals,
                }
            })
            .collect();

        let price: SharedPrice = Arc::new(ArcSwap::from_pointee(PriceState::fallback(config.price.fallback_usd)));
        let oracle = PriceOracle::new(source, &config.price, price.clone()).with_signals(signal_tx);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (connected, _) = watch::channel(false);

        Self {
            networks,
            store,
            price,
            oracle: Arc::new(oracle),
            backfill: BackfillPolicy::from(&config.ohlc),
            events,
            connected: Arc::new(connected),
            signals: Mutex::new(Some(signal_rx)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started_at: Instant::now(),
        }
    }

    // no-op when already started or stopped
    pub fn start(&self) {
        let Some(signals) = self.signals.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(tokio::spawn(fan_in(
            signals,
            self.networks.iter().map(|n| n.manager.network().clone()).collect(),
            self.events.clone(),
            self.connected.clone(),
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(self.oracle.clone().run(self.cancel.child_token())));

        for network in &self.networks {
            network.manager.start();
        }

        tracing::info!(networks = self.networks.len(), "Feed coordinator started");
    }

    pub async fn stop(&self) {
        for network in &self.networks {
            network.manager.stop().await;
        }

        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Coordinator task panicked");
            }
        }

        publish_connected(&self.connected, &self.events, false);
        tracing::info!("Feed coordinator stopped");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    // true while at least one network is subscribed
    pub fn connection_watch(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn managed(&self, network: &NetworkId) -> Result<&ManagedNetwork, FeedError> {
        self.networks
            .iter()
            .find(|n| n.manager.network() == network)
            .ok_or_else(|| FeedError::UnknownNetwork(network.to_string()))
    }

    fn state_of(&self, managed: &ManagedNetwork) -> NetworkState {
        let network = managed.manager.network().clone();
        let history = self.store.snapshot(&network);
        NetworkState {
            status: managed.manager.status(),
            latest: history.last().cloned(),
            history: history.to_vec(),
            network,
        }
    }

    pub fn snapshot(&self, network: &NetworkId) -> Option<NetworkState> {
        self.managed(network).ok().map(|managed| self.state_of(managed))
    }

    pub fn snapshots(&self) -> Vec<NetworkState> {
        self.networks.iter().map(|managed| self.state_of(managed)).collect()
    }

    pub fn status(&self, network: &NetworkId) -> Option<ConnectionStatus> {
        self.managed(network).ok().map(|managed| managed.manager.status())
    }

    pub fn ohlc(&self, network: &NetworkId, interval_minutes: u64, backfill: bool) -> Result<Vec<OhlcBar>, FeedError> {
        self.managed(network)?;
        if interval_minutes == 0 {
            return Err(FeedError::InvalidRequest("interval_minutes must be positive".into()));
        }

        let history = self.store.snapshot(network);
        let interval = Duration::from_secs(interval_minutes.saturating_mul(60));
        Ok(if backfill {
            compute_ohlc_with_backfill(&history, interval, &self.backfill)
        } else {
            compute_ohlc(&history, interval)
        })
    }

    // networks without a sample are left out
    pub fn simulate(&self, transfer_amount: f64) -> Result<Simulation, FeedError> {
        if !transfer_amount.is_finite() || transfer_amount < 0.0 {
            return Err(FeedError::InvalidRequest(format!(
                "transfer amount must be a non-negative number, got {}",
                transfer_amount
            )));
        }

        let samples: Vec<_> = self
            .networks
            .iter()
            .filter_map(|managed| {
                let network = managed.manager.network();
                self.store
                    .latest(network)
                    .map(|sample| (network.clone(), sample, managed.decimals))
            })
            .collect();

        Ok(simulator::simulate(&samples, self.price().usd_per_base_asset, transfer_amount))
    }

    pub fn price(&self) -> PriceState {
        **self.price.load()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.price().last_updated
    }

    pub async fn refresh_price(&self) -> Result<PriceState, FeedError> {
        self.oracle.refresh().await
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn publish_connected(connected: &watch::Sender<bool>, events: &broadcast::Sender<FeedEvent>, value: bool) {
    let changed = connected.send_if_modified(|current| {
        let changed = *current != value;
        *current = value;
        changed
    });
    if changed {
        tracing::info!(connected = value, "Overall feed connectivity changed");
        let _ = events.send(FeedEvent::Connection { connected: value });
    }
}

fn forward(
    signal: FeedSignal,
    statuses: &mut HashMap<NetworkId, ConnectionStatus>,
    events: &broadcast::Sender<FeedEvent>,
    connected: &watch::Sender<bool>,
) {
    match signal {
        FeedSignal::Sample { network, sample } => {
            let _ = events.send(FeedEvent::Sample { network, sample });
        }
        FeedSignal::Price(price) => {
            let _ = events.send(FeedEvent::Price { price });
        }
        FeedSignal::Status { network, status } => {
            statuses.insert(network, status);
            let any = statuses.values().any(ConnectionStatus::is_connected);
            publish_connected(connected, events, any);
        }
    }
}

async fn fan_in(
    mut signals: mpsc::UnboundedReceiver<FeedSignal>,
    networks: Vec<NetworkId>,
    events: broadcast::Sender<FeedEvent>,
    connected: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
) {
    let mut statuses: HashMap<NetworkId, ConnectionStatus> = networks
        .into_iter()
        .map(|network| (network, ConnectionStatus::Disconnected))
        .collect();

    loop {
        tokio::select! {
            biased;
            signal = signals.recv() => match signal {
                Some(signal) => forward(signal, &mut statuses, &events, &connected),
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(signal) = signals.try_recv() {
                    forward(signal, &mut statuses, &events, &connected);
                }
                break;
            }
        }
    }

    tracing::debug!("Signal fan-in stopped");
}
