//! JSON-RPC chain client backed by an alloy provider.

use alloy::network::ReceiptResponse;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy_primitives::{Address, B256, Bytes, TxKind};
use async_trait::async_trait;
use snacks_core::chain::{ChainClient, ChainError, TxReceipt};
use tracing::debug;

/// `ChainClient` over an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient").finish_non_exhaustive()
    }
}

impl RpcChainClient {
    /// Connects to `rpc_url`.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Transport` if the URL is invalid or the endpoint
    /// cannot be reached.
    pub async fn connect(rpc_url: &str) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Self {
            provider: provider.erased(),
        })
    }
}

/// Maps a node's error message onto the error kinds the submitter acts on.
/// Nodes only agree on message text, not on error codes.
pub(crate) fn classify_rpc_error(message: &str) -> ChainError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("already known") || lower.contains("known transaction") {
        ChainError::AlreadyKnown
    } else if lower.contains("nonce too low") {
        ChainError::NonceTooLow
    } else if ["underpriced", "fee too low", "insufficient funds", "intrinsic gas", "gas limit"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        ChainError::Refused(message.to_owned())
    } else if lower.contains("execution reverted") {
        ChainError::CallReverted(message.to_owned())
    } else {
        ChainError::Transport(message.to_owned())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| classify_rpc_error(&e.to_string()))
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(input),
            ..Default::default()
        };
        self.provider
            .call(request)
            .await
            .map_err(|e| classify_rpc_error(&e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| classify_rpc_error(&e.to_string()))?;
        debug!(tx_hash = %pending.tx_hash(), "raw transaction accepted by node");
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify_rpc_error(&e.to_string()))?;
        Ok(receipt.map(|r| TxReceipt {
            tx_hash,
            block_number: r.block_number.unwrap_or_default(),
            success: r.status(),
            logs: r.inner.logs().iter().map(|l| l.inner.clone()).collect(),
        }))
    }
}
