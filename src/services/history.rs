use crate::{
    config::DEFAULT_HISTORY_CAPACITY,
    models::{GasSample, NetworkId},
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

pub type History = Arc<Vec<GasSample>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Stale { latest_block: u64 },
}

/// Bounded per-network sample history. Appends publish a fresh vector with
/// one pointer swap; readers never wait on the writer.
pub struct HistoryStore {
    capacity: usize,
    networks: DashMap<NetworkId, Arc<ArcSwap<Vec<GasSample>>>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            networks: DashMap::new(),
        }
    }

    pub fn register(&self, network: &NetworkId) {
        self.slot(network);
    }

    fn slot(&self, network: &NetworkId) -> Arc<ArcSwap<Vec<GasSample>>> {
        if let Some(slot) = self.networks.get(network) {
            return slot.clone();
        }
        self.networks
            .entry(network.clone())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(Vec::new())))
            .clone()
    }

    pub fn append(&self, network: &NetworkId, sample: GasSample) -> AppendOutcome {
        let slot = self.slot(network);
        let capacity = self.capacity;
        let mut outcome = AppendOutcome::Appended;

        slot.rcu(|current| match current.last() {
            Some(last)
                if sample.block_number <= last.block_number
                    || sample.timestamp_ms < last.timestamp_ms =>
            {
                outcome = AppendOutcome::Stale {
                    latest_block: last.block_number,
                };
                Arc::clone(current)
            }
            _ => {
                outcome = AppendOutcome::Appended;
                let skip = (current.len() + 1).saturating_sub(capacity);
                let mut next = Vec::with_capacity(capacity);
                next.extend_from_slice(&current[skip..]);
                next.push(sample.clone());
                Arc::new(next)
            }
        });

        if let AppendOutcome::Stale { latest_block } = outcome {
            tracing::debug!(
                network = %network,
                block = sample.block_number,
                latest_block,
                "Rejected stale or duplicate sample"
            );
        }

        outcome
    }

    pub fn latest(&self, network: &NetworkId) -> Option<GasSample> {
        let slot = self.networks.get(network)?.clone();
        let history = slot.load();
        history.last().cloned()
    }

    pub fn snapshot(&self, network: &NetworkId) -> History {
        match self.networks.get(network) {
            Some(slot) => slot.load_full(),
            None => Arc::new(Vec::new()),
        }
    }
}
