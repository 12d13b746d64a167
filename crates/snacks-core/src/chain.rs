//! Chain collaborator abstraction.
//!
//! The engine only needs four primitives from the network: the deployer's
//! pending transaction count, read-only calls, raw transaction broadcast and
//! receipt lookup. Everything else (fees, signing, retries) lives above this
//! seam.

use alloy_primitives::{Address, B256, Bytes, Log, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DomainError;

/// Errors reported by a chain client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The node could not be reached or answered with a malformed response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node refused the transaction before inclusion (e.g. underpriced).
    #[error("transaction refused: {0}")]
    Refused(String),

    /// The node already has this exact transaction.
    #[error("transaction already known")]
    AlreadyKnown,

    /// The nonce was already consumed on chain.
    #[error("nonce too low")]
    NonceTooLow,

    /// A read-only call reverted.
    #[error("call reverted: {0}")]
    CallReverted(String),
}

impl From<ChainError> for DomainError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Transport(msg) => Self::Infrastructure(format!("chain transport: {msg}")),
            ChainError::CallReverted(msg) => Self::ChainRejected(format!("call reverted: {msg}")),
            other => Self::ChainRejected(other.to_string()),
        }
    }
}

/// Parameters of a transaction before nonce, fees and signature are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    /// Target contract or account.
    pub to: Address,
    /// ABI-encoded calldata.
    pub input: Bytes,
    /// Value transferred, in wei.
    pub value: U256,
    /// Gas limit.
    pub gas_limit: u64,
}

/// Inclusion receipt for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Hash of the included transaction.
    pub tx_hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// `true` when execution succeeded, `false` when it reverted.
    pub success: bool,
    /// Logs emitted by the transaction.
    pub logs: Vec<Log>,
}

/// Read and broadcast primitives against one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Returns the number of transactions sent by `address`, including
    /// transactions still pending in the node's mempool.
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError>;

    /// Executes a read-only call against the latest state.
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError>;

    /// Broadcasts a signed, EIP-2718 encoded transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError>;

    /// Returns the receipt for `tx_hash`, or `None` while it is not included.
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError>;
}
