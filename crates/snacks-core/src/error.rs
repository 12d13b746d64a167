//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
///
/// Every component error converts into this type before it reaches the
/// workflow engine, which uses the variant to decide whether to advance,
/// retry, or halt a workflow.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed metadata pointer or missing contract/attestation settings.
    /// Fatal; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A transaction was included and reverted, or refused by the node until
    /// its nonce had to be burned. Terminal for the attempt.
    #[error("chain rejected transaction: {0}")]
    ChainRejected(String),

    /// A transaction was not observed on chain before the confirmation
    /// timeout. Safe to retry by redelivering the same request.
    #[error("transaction unconfirmed: {0}")]
    ChainUnconfirmed(String),

    /// Two sources that must agree (e.g. computed and queried bound-account
    /// addresses) disagree.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A per-key compare-and-set lost against another writer.
    #[error("concurrency conflict on {key}: {detail}")]
    ConcurrencyConflict {
        /// The contended key.
        key: String,
        /// What was already recorded.
        detail: String,
    },

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` when redelivering the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainUnconfirmed(_) | Self::Infrastructure(_))
    }
}
