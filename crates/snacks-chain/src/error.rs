//! Submission error types.

use std::time::Duration;

use alloy_primitives::B256;
use snacks_core::error::DomainError;
use thiserror::Error;

/// Outcome of a submission that did not end in a successful receipt.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Included and reverted; the nonce is consumed.
    #[error("transaction {tx_hash} reverted in block {block_number}")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: B256,
        /// Block it was included in.
        block_number: u64,
    },

    /// Not included before the confirmation timeout.
    #[error("nonce {nonce} unconfirmed after {waited:?} ({} candidate hashes)", .tx_hashes.len())]
    Unconfirmed {
        /// Nonce shared by every candidate.
        nonce: u64,
        /// Every hash signed for this nonce so far.
        tx_hashes: Vec<B256>,
        /// How long confirmation was awaited.
        waited: Duration,
    },

    /// Refused by the node on every attempt; the nonce was burned.
    #[error("nonce {nonce} refused {attempts} times and burned: {reason}")]
    Rejected {
        /// The burned nonce.
        nonce: u64,
        /// Last refusal reason.
        reason: String,
        /// Broadcast attempts made.
        attempts: u32,
    },

    /// The deployer key could not sign.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The audit log could not be written.
    #[error(transparent)]
    Audit(#[from] DomainError),

    /// Failed before anything was broadcast; the nonce is still unused.
    #[error("nonce {nonce} never broadcast: {source}")]
    Unsent {
        /// The unused nonce.
        nonce: u64,
        /// Why nothing went out.
        source: Box<SubmitError>,
    },
}

impl From<SubmitError> for DomainError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Reverted { .. } | SubmitError::Rejected { .. } => {
                Self::ChainRejected(err.to_string())
            }
            SubmitError::Unconfirmed { .. } => Self::ChainUnconfirmed(err.to_string()),
            SubmitError::Signing(msg) => Self::Configuration(format!("deployer key: {msg}")),
            SubmitError::Audit(inner) => inner,
            SubmitError::Unsent { source, .. } => Self::from(*source),
        }
    }
}
