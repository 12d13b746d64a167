//! ABI bindings and deployed contract addresses.

use alloy_primitives::Address;
use alloy_sol_types::sol;

sol! {
    /// The asset and attestation NFT contracts share this interface.
    interface ITummyNft {
        function mintNFT(address recipient, string tokenURI) external returns (uint256);
        function setTokenURI(uint256 tokenId, string tokenURI) external;

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }

    /// ERC-6551 registry (v0.2 reference deployment).
    interface IERC6551Registry {
        function createAccount(
            address implementation,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId,
            uint256 salt,
            bytes initData
        ) external returns (address);

        function account(
            address implementation,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId,
            uint256 salt
        ) external view returns (address);

        event AccountCreated(
            address account,
            address implementation,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId,
            uint256 salt
        );
    }
}

/// Deployed contract addresses and the chain they live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractSet {
    /// The per-user asset NFT.
    pub asset: Address,
    /// The ERC-6551 registry.
    pub registry: Address,
    /// The ERC-6551 account implementation the registry clones.
    pub account_implementation: Address,
    /// The proof-of-visit attestation NFT.
    pub attestation: Address,
    /// Chain id passed to the registry.
    pub chain_id: u64,
}
