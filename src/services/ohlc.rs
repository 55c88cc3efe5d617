use crate::{
    config::OhlcConfig,
    models::{GasSample, OhlcBar},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackfillPolicy {
    pub min_bars: usize,
    // max relative deviation from the anchor, 0.05 = 5%
    pub jitter: f64,
}

impl From<&OhlcConfig> for BackfillPolicy {
    fn from(config: &OhlcConfig) -> Self {
        Self {
            min_bars: config.min_bars,
            jitter: config.jitter.clamp(0.0, 0.5),
        }
    }
}

pub fn compute_ohlc(samples: &[GasSample], interval: Duration) -> Vec<OhlcBar> {
    let width = bucket_width(interval);
    let mut bars: BTreeMap<u64, OhlcBar> = BTreeMap::new();

    for sample in samples {
        let bucket_start = sample.timestamp_ms / width * width;
        let price = sample.price();
        bars.entry(bucket_start)
            .and_modify(|bar| bar.push(price))
            .or_insert_with(|| OhlcBar::opening(bucket_start, price));
    }

    bars.into_values().collect()
}

/// [`compute_ohlc`] plus synthetic bars ahead of the first real bucket when
/// fewer than `policy.min_bars` real bars exist. Synthetic bars are anchored
/// on the latest sample's price and seeded by bucket start, so the output is
/// deterministic for a given input.
pub fn compute_ohlc_with_backfill(
    samples: &[GasSample],
    interval: Duration,
    policy: &BackfillPolicy,
) -> Vec<OhlcBar> {
    let real = compute_ohlc(samples, interval);
    if real.len() >= policy.min_bars {
        return real;
    }
    let (Some(first_start), Some(anchor)) = (real.first().map(|bar| bar.bucket_start_ms), samples.last()) else {
        return real;
    };

    let width = bucket_width(interval);
    let missing = policy.min_bars - real.len();
    let anchor_price = anchor.price();

    let mut synthetic: Vec<OhlcBar> = (1..=missing as u64)
        .map_while(|back| back.checked_mul(width).and_then(|offset| first_start.checked_sub(offset)))
        .map(|bucket_start| synthetic_bar(bucket_start, anchor_price, policy.jitter))
        .collect();
    synthetic.reverse();

    tracing::debug!(
        real = real.len(),
        synthetic = synthetic.len(),
        "Backfilled sparse OHLC series"
    );

    synthetic.extend(real);
    synthetic
}

// saturates, so over-wide intervals collapse into one bucket
fn bucket_width(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn synthetic_bar(bucket_start_ms: u64, anchor: f64, jitter: f64) -> OhlcBar {
    let mut rng = StdRng::seed_from_u64(bucket_start_ms);
    let mut jittered = || {
        if jitter > 0.0 {
            anchor * (1.0 + rng.gen_range(-jitter..=jitter))
        } else {
            anchor
        }
    };

    let open = jittered();
    let close = jittered();
    let high = open.max(close) * (1.0 + jitter / 2.0);
    let low = open.min(close) * (1.0 - jitter / 2.0);

    OhlcBar {
        bucket_start_ms,
        open,
        high,
        low,
        close,
        sample_count: 0,
        synthetic: true,
    }
}
