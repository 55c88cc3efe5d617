use crate::{
    config::{BackoffConfig, FeedConfig},
    error::FeedError,
    models::{ConnectionStatus, GasSample, NetworkId, PriceState, SampleConfidence},
    services::{
        chain::{ChainClient, ChainConnector, HeadStream},
        history::{AppendOutcome, HistoryStore},
        normalize::NormalizationStrategy,
    },
};
use futures::StreamExt;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum FeedSignal {
    Sample { network: NetworkId, sample: GasSample },
    Status { network: NetworkId, status: ConnectionStatus },
    Price(PriceState),
}

pub fn backoff_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    let exp = attempt.saturating_sub(1).min(8);
    let delay = config
        .base
        .saturating_mul(2u32.saturating_pow(exp))
        .min(config.max);
    if config.jitter <= 0.0 {
        return delay;
    }
    let jitter_ms = (delay.as_millis() as f64 * config.jitter * rand::thread_rng().gen::<f64>()) as u64;
    delay + Duration::from_millis(jitter_ms)
}

enum SessionEnd {
    Stopped,
    Failed(FeedError),
}

/// Owns the head subscription of one network and is the only writer of
/// that network's history.
///
/// `Disconnected -> Connecting -> Subscribed -> Erroring -> Connecting ...`
/// until [`stop`](Self::stop), after which the manager stays `Disconnected`.
pub struct ChainFeedManager {
    network: NetworkId,
    connector: Arc<dyn ChainConnector>,
    strategy: NormalizationStrategy,
    store: Arc<HistoryStore>,
    connect_timeout: Duration,
    backoff: BackoffConfig,
    signals: mpsc::UnboundedSender<FeedSignal>,
    status: watch::Sender<ConnectionStatus>,
    in_fallback: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChainFeedManager {
    pub fn new(
        network: NetworkId,
        connector: Arc<dyn ChainConnector>,
        strategy: NormalizationStrategy,
        store: Arc<HistoryStore>,
        config: &FeedConfig,
        signals: mpsc::UnboundedSender<FeedSignal>,
    ) -> Self {
        store.register(&network);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            network,
            connector,
            strategy,
            store,
            connect_timeout: config.connect_timeout,
            backoff: config.backoff.clone(),
            signals,
            status,
            in_fallback: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
    }

    // idempotent
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(network = %self.network, error = %e, "Feed task panicked");
            }
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(network = %self.network, from = ?previous, to = ?status, "Feed status changed");
            let _ = self.signals.send(FeedSignal::Status {
                network: self.network.clone(),
                status,
            });
        }
    }

    async fn run(self: Arc<Self>) {
        let mut attempts: u32 = 0;

        loop {
            self.set_status(ConnectionStatus::Connecting);

            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                opened = timeout(self.connect_timeout, self.open()) => {
                    opened.unwrap_or(Err(FeedError::Timeout(self.connect_timeout)))
                }
            };

            let failure = match opened {
                Ok((client, heads)) => {
                    attempts = 0;
                    self.set_status(ConnectionStatus::Subscribed);
                    tracing::info!(network = %self.network, "Subscribed to new heads");

                    match self.consume(client, heads).await {
                        SessionEnd::Stopped => break,
                        SessionEnd::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.set_status(ConnectionStatus::Erroring);
            attempts = attempts.saturating_add(1);
            let delay = backoff_delay(attempts, &self.backoff);
            tracing::warn!(
                network = %self.network,
                error = %failure,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Feed connection lost, reconnecting"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_status(ConnectionStatus::Disconnected);
        tracing::info!(network = %self.network, "Feed stopped");
    }

    async fn open(&self) -> Result<(Arc<dyn ChainClient>, HeadStream), FeedError> {
        let client = self.connector.connect().await?;
        let heads = client.subscribe_heads().await?;
        Ok((client, heads))
    }

    async fn consume(&self, client: Arc<dyn ChainClient>, mut heads: HeadStream) -> SessionEnd {
        loop {
            let head = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Stopped,
                head = heads.next() => head,
            };

            let number = match head {
                Some(Ok(number)) => number,
                Some(Err(e)) if e.is_transport() => return SessionEnd::Failed(e),
                Some(Err(e)) => {
                    tracing::warn!(network = %self.network, error = %e, "Malformed head notification");
                    continue;
                }
                None => return SessionEnd::Failed(FeedError::Connection("head stream closed".into())),
            };

            let processed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Stopped,
                processed = self.on_block(client.as_ref(), number) => processed,
            };

            match processed {
                Ok(()) => {}
                Err(e) if e.is_transport() => return SessionEnd::Failed(e),
                Err(e) => {
                    tracing::warn!(network = %self.network, block = number, error = %e, "Dropped block");
                }
            }
        }
    }

    // one warning per outage, not per block
    fn track_fallback(&self, sample: &GasSample) -> bool {
        let fallback = sample.confidence == SampleConfidence::Fallback;
        if self.in_fallback.swap(fallback, Ordering::Relaxed) == fallback {
            return false;
        }
        if fallback {
            tracing::warn!(
                network = %self.network,
                block = sample.block_number,
                "Estimator unavailable, switching to single-layer fallback"
            );
        } else {
            tracing::info!(network = %self.network, block = sample.block_number, "Estimator recovered");
        }
        true
    }

    async fn on_block(&self, client: &dyn ChainClient, number: u64) -> Result<(), FeedError> {
        if let Some(latest) = self.store.latest(&self.network) {
            if number <= latest.block_number {
                tracing::debug!(network = %self.network, block = number, "Skipping already stored head");
                return Ok(());
            }
        }

        let block = client.fetch_block(number).await?;

        let estimate = if self.strategy.needs_estimate() {
            client
                .estimate_dual_layer()
                .await
                .map_err(|e| {
                    tracing::debug!(network = %self.network, block = number, error = %e, "Estimator call failed");
                })
                .ok()
        } else {
            None
        };

        let sample = self.strategy.normalize(&self.network, &block, estimate.as_ref());
        self.track_fallback(&sample);

        if self.store.append(&self.network, sample.clone()) == AppendOutcome::Appended {
            tracing::debug!(
                network = %self.network,
                block = sample.block_number,
                gwei = sample.effective_gas_price_gwei(),
                "Sample stored"
            );
            let _ = self.signals.send(FeedSignal::Sample {
                network: self.network.clone(),
                sample,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockFees, DualLayerEstimate, SampleConfidence};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        heads: Mutex<Option<mpsc::UnboundedReceiver<Result<u64, FeedError>>>>,
        estimate: Option<DualLayerEstimate>,
    }

    #[async_trait]
    impl ChainClient for ScriptedClient {
        async fn subscribe_heads(&self) -> Result<HeadStream, FeedError> {
            let mut rx = self
                .heads
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| FeedError::SubscriptionRejected("already subscribed".into()))?;
            Ok(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
        }

        async fn fetch_block(&self, number: u64) -> Result<BlockFees, FeedError> {
            Ok(BlockFees {
                number,
                timestamp_secs: number * 12,
                base_fee_per_gas: Some(number as u128 * 1_000),
            })
        }

        async fn estimate_dual_layer(&self) -> Result<DualLayerEstimate, FeedError> {
            self.estimate
                .ok_or_else(|| FeedError::EstimatorUnavailable("no estimator".into()))
        }
    }

    struct ScriptedConnector {
        sessions: Mutex<Vec<Arc<ScriptedClient>>>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ChainConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut sessions = self.sessions.lock().unwrap();
            if sessions.is_empty() {
                return Err(FeedError::Connection("refused".into()));
            }
            Ok(sessions.remove(0))
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl ChainConnector for HangingConnector {
        async fn connect(&self) -> Result<Arc<dyn ChainClient>, FeedError> {
            std::future::pending().await
        }
    }

    fn session(estimate: Option<DualLayerEstimate>) -> (mpsc::UnboundedSender<Result<u64, FeedError>>, Arc<ScriptedClient>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(ScriptedClient {
            heads: Mutex::new(Some(rx)),
            estimate,
        });
        (tx, client)
    }

    fn fast_config() -> FeedConfig {
        FeedConfig {
            connect_timeout: Duration::from_millis(200),
            backoff: BackoffConfig {
                base: Duration::from_millis(10),
                max: Duration::from_millis(40),
                jitter: 0.0,
            },
            ..FeedConfig::default()
        }
    }

    fn manager(
        sessions: Vec<Arc<ScriptedClient>>,
        strategy: NormalizationStrategy,
    ) -> (Arc<ChainFeedManager>, Arc<HistoryStore>, mpsc::UnboundedReceiver<FeedSignal>, Arc<ScriptedConnector>) {
        let store = Arc::new(HistoryStore::new(60));
        let connector = Arc::new(ScriptedConnector {
            sessions: Mutex::new(sessions),
            attempts: AtomicUsize::new(0),
        });
        let (signals, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(ChainFeedManager::new(
            NetworkId::ethereum(),
            connector.clone(),
            strategy,
            store.clone(),
            &fast_config(),
            signals,
        ));
        (manager, store, rx, connector)
    }

    async fn next_sample(rx: &mut mpsc::UnboundedReceiver<FeedSignal>) -> GasSample {
        loop {
            let signal = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("signal before timeout")
                .expect("channel open");
            if let FeedSignal::Sample { sample, .. } = signal {
                return sample;
            }
        }
    }

    async fn wait_for_status(manager: &ChainFeedManager, wanted: ConnectionStatus) {
        let mut watch = manager.status_watch();
        timeout(Duration::from_secs(2), watch.wait_for(|s| *s == wanted))
            .await
            .expect("status reached before timeout")
            .expect("watch open");
    }

    #[test]
    fn backoff_is_capped_exponential() {
        let config = BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: 0.0,
        };
        let delays: Vec<u64> = (1..=6).map(|a| backoff_delay(a, &config).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff_delay(u32::MAX, &config), Duration::from_secs(1));
    }

    #[test]
    fn backoff_jitter_is_bounded() {
        let config = BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: 0.5,
        };
        for _ in 0..100 {
            let delay = backoff_delay(1, &config);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn stores_blocks_in_order_and_skips_duplicates() {
        let (heads, client) = session(None);
        let strategy = NormalizationStrategy::Standard { priority_fee: 2 };
        let (manager, store, mut rx, _) = manager(vec![client], strategy);

        manager.start();
        wait_for_status(&manager, ConnectionStatus::Subscribed).await;

        for n in [100, 101, 101, 100, 102] {
            heads.send(Ok(n)).unwrap();
        }
        for expected in [100, 101, 102] {
            assert_eq!(next_sample(&mut rx).await.block_number, expected);
        }

        let history = store.snapshot(&NetworkId::ethereum());
        let blocks: Vec<u64> = history.iter().map(|s| s.block_number).collect();
        assert_eq!(blocks, vec![100, 101, 102]);
        assert_eq!(history[0].effective_gas_price, 100_000 + 2);

        manager.stop().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn reconnects_after_stream_drop() {
        let (first_heads, first) = session(None);
        let (second_heads, second) = session(None);
        let strategy = NormalizationStrategy::Standard { priority_fee: 0 };
        let (manager, store, mut rx, connector) = manager(vec![first, second], strategy);

        manager.start();
        wait_for_status(&manager, ConnectionStatus::Subscribed).await;
        first_heads.send(Ok(1)).unwrap();
        next_sample(&mut rx).await;

        // transport drops
        drop(first_heads);

        let mut saw_erroring = false;
        loop {
            let signal = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
            match signal {
                FeedSignal::Status { status: ConnectionStatus::Erroring, .. } => saw_erroring = true,
                FeedSignal::Status { status: ConnectionStatus::Subscribed, .. } => break,
                _ => {}
            }
        }
        assert!(saw_erroring);

        second_heads.send(Ok(1)).unwrap();
        second_heads.send(Ok(2)).unwrap();
        assert_eq!(next_sample(&mut rx).await.block_number, 2);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.snapshot(&NetworkId::ethereum()).len(), 2);

        manager.stop().await;
    }

    #[tokio::test]
    async fn keeps_retrying_while_connector_fails() {
        let strategy = NormalizationStrategy::Standard { priority_fee: 0 };
        let (manager, _, _rx, connector) = manager(Vec::new(), strategy);

        manager.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(connector.attempts.load(Ordering::SeqCst) >= 3);
        assert_ne!(manager.status(), ConnectionStatus::Subscribed);

        manager.stop().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn dual_layer_without_estimator_stores_fallback_sample() {
        let (heads, client) = session(None);
        let strategy = NormalizationStrategy::DualLayer { priority_fee: 2_000_000_000 };
        let (manager, _, mut rx, _) = manager(vec![client], strategy);

        manager.start();
        wait_for_status(&manager, ConnectionStatus::Subscribed).await;
        heads.send(Ok(5)).unwrap();

        let sample = next_sample(&mut rx).await;
        assert_eq!(sample.confidence, SampleConfidence::Fallback);
        assert_eq!(sample.base_fee, 5_000);
        assert!(sample.effective_gas_price > 0);

        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_final() {
        let (_heads, client) = session(None);
        let strategy = NormalizationStrategy::Standard { priority_fee: 0 };
        let (manager, _, _rx, connector) = manager(vec![client], strategy);

        manager.start();
        wait_for_status(&manager, ConnectionStatus::Subscribed).await;

        let other = manager.clone();
        tokio::spawn(async move { other.stop().await }).await.unwrap();
        manager.stop().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);

        manager.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hanging_handshake_times_out_into_erroring() {
        let (signals, mut rx) = mpsc::unbounded_channel();
        let manager = Arc::new(ChainFeedManager::new(
            NetworkId::polygon(),
            Arc::new(HangingConnector),
            NormalizationStrategy::Standard { priority_fee: 0 },
            Arc::new(HistoryStore::new(60)),
            &fast_config(),
            signals,
        ));

        let started = tokio::time::Instant::now();
        manager.start();
        wait_for_status(&manager, ConnectionStatus::Erroring).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "gave up after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "stalled for {:?}", elapsed);

        // stop still returns while the next handshake hangs
        timeout(Duration::from_secs(1), manager.stop()).await.expect("stop returns");
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);

        while let Ok(signal) = rx.try_recv() {
            assert!(!matches!(signal, FeedSignal::Sample { .. }));
        }
    }

    #[tokio::test]
    async fn malformed_head_is_skipped_without_reconnecting() {
        let (heads, client) = session(None);
        let strategy = NormalizationStrategy::Standard { priority_fee: 0 };
        let (manager, store, mut rx, connector) = manager(vec![client], strategy);

        manager.start();
        wait_for_status(&manager, ConnectionStatus::Subscribed).await;

        heads.send(Ok(10)).unwrap();
        heads.send(Err(FeedError::Decode("head without block number".into()))).unwrap();
        heads.send(Ok(11)).unwrap();

        assert_eq!(next_sample(&mut rx).await.block_number, 10);
        assert_eq!(next_sample(&mut rx).await.block_number, 11);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status(), ConnectionStatus::Subscribed);
        assert_eq!(store.snapshot(&NetworkId::ethereum()).len(), 2);

        manager.stop().await;
    }

    #[test]
    fn fallback_is_reported_once_per_outage() {
        let (signals, _rx) = mpsc::unbounded_channel();
        let manager = ChainFeedManager::new(
            NetworkId::arbitrum(),
            Arc::new(HangingConnector),
            NormalizationStrategy::DualLayer { priority_fee: 0 },
            Arc::new(HistoryStore::new(60)),
            &fast_config(),
            signals,
        );
        let block = |number| BlockFees {
            number,
            timestamp_secs: number,
            base_fee_per_gas: Some(10),
        };
        let estimate = DualLayerEstimate {
            l2_gas_estimate: 21_000,
            l2_base_fee: 10,
            l1_gas_estimate: 0,
            l1_base_fee_estimate: 0,
        };
        let normalize = |number, estimate: Option<&DualLayerEstimate>| {
            manager.strategy.normalize(manager.network(), &block(number), estimate)
        };

        let transitions: Vec<bool> = [
            normalize(1, Some(&estimate)),
            normalize(2, None),
            normalize(3, None),
            normalize(4, None),
            normalize(5, Some(&estimate)),
            normalize(6, None),
        ]
        .iter()
        .map(|sample| manager.track_fallback(sample))
        .collect();

        assert_eq!(transitions, vec![false, true, false, false, true, true]);
    }
}
