pub mod chain;
pub mod coordinator;
pub mod feed;
pub mod history;
pub mod normalize;
pub mod ohlc;
pub mod price_oracle;
pub mod simulator;

pub use chain::{ChainClient, ChainConnector, HeadStream, WsConnector};
pub use coordinator::FeedCoordinator;
pub use feed::{ChainFeedManager, FeedSignal};
pub use history::{AppendOutcome, HistoryStore};
pub use normalize::NormalizationStrategy;
pub use price_oracle::{PriceOracle, SwapSource, UniswapV3SwapSource};
