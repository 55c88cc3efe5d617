pub mod event;
pub mod gas;
pub mod network;
pub mod ohlc;
pub mod price;
pub mod response;
pub mod simulation;

pub use event::*;
pub use gas::*;
pub use network::*;
pub use ohlc::*;
pub use price::*;
pub use response::*;
pub use simulation::*;
