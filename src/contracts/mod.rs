pub mod node_interface;
pub mod uniswap_v3_pool;

pub use node_interface::{NodeInterface, NODE_INTERFACE_ADDRESS};
pub use uniswap_v3_pool::{SwapFilter, UniswapV3Pool};
