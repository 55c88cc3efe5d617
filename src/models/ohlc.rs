use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub bucket_start_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub sample_count: usize,
    pub synthetic: bool,
}

impl OhlcBar {
    pub(crate) fn opening(bucket_start_ms: u64, price: f64) -> Self {
        Self {
            bucket_start_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            sample_count: 1,
            synthetic: false,
        }
    }

    pub(crate) fn push(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.sample_count += 1;
    }
}
