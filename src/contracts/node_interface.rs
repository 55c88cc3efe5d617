use ethers::prelude::*;

// Arbitrum NodeInterface precompile
abigen!(
    NodeInterface,
    r#"[
        function gasEstimateComponents(address to, bool contractCreation, bytes data) external payable returns (uint64 gasEstimate, uint64 gasEstimateForL1, uint256 baseFee, uint256 l1BaseFeeEstimate)
    ]"#
);

pub const NODE_INTERFACE_ADDRESS: &str = "0x00000000000000000000000000000000000000C8";
