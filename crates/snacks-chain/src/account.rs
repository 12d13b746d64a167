//! The deployer account: the one hot key allowed to mutate assets.

use std::fmt;
use std::str::FromStr;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, B256, Bytes};

use crate::error::SubmitError;

/// A signed, EIP-2718 encoded transaction and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    /// Transaction hash, known before broadcast.
    pub hash: B256,
    /// Encoded bytes for `eth_sendRawTransaction`.
    pub raw: Bytes,
}

/// Holds the deployer's private key. `Debug` prints only the address.
pub struct DeployerAccount {
    signer: PrivateKeySigner,
}

impl DeployerAccount {
    /// Parses a hex private key, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Signing` if the key is not a valid secp256k1
    /// scalar. The key itself never appears in the error.
    pub fn from_hex(private_key: &str) -> Result<Self, SubmitError> {
        PrivateKeySigner::from_str(private_key.trim())
            .map(|signer| Self { signer })
            .map_err(|_| SubmitError::Signing("deployer private key is malformed".into()))
    }

    /// The deployer's address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs an EIP-1559 transaction.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Signing` if the signer fails.
    pub fn sign(&self, tx: TxEip1559) -> Result<SignedTx, SubmitError> {
        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| SubmitError::Signing(e.to_string()))?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(SignedTx {
            hash: *envelope.tx_hash(),
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }
}

impl fmt::Debug for DeployerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployerAccount")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
