//! Submission audit log abstraction.
//!
//! Every signed transaction is recorded before it is broadcast, so a process
//! that dies while waiting for confirmation can re-check the hash instead of
//! allocating a fresh nonce.

use alloy_primitives::{B256, Bytes};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chain::UnsignedTx;
use crate::error::DomainError;
use crate::workflow::{IdempotencyKey, StepKind};

/// Why a transaction was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPurpose {
    /// A workflow step.
    Step {
        /// The workflow's idempotency key.
        key: IdempotencyKey,
        /// The step being executed.
        step: StepKind,
    },
    /// A zero-value self-transfer that consumes an otherwise unusable nonce.
    Burn,
}

/// Lifecycle of one signed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Signed and possibly broadcast; outcome unknown.
    Pending,
    /// Refused by the node before entering its mempool.
    Refused,
    /// Included and succeeded.
    Confirmed,
    /// Included and reverted.
    Reverted,
    /// Another transaction with the same nonce was included instead.
    Superseded,
}

impl SubmissionStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Refused => "refused",
            Self::Confirmed => "confirmed",
            Self::Reverted => "reverted",
            Self::Superseded => "superseded",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "refused" => Some(Self::Refused),
            "confirmed" => Some(Self::Confirmed),
            "reverted" => Some(Self::Reverted),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }
}

/// Durable record of a signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Why the transaction was sent.
    pub purpose: SubmissionPurpose,
    /// Nonce the transaction was signed with.
    pub nonce: u64,
    /// Hash of the signed transaction.
    pub tx_hash: B256,
    /// The unsigned parameters, kept so a replacement can be re-signed.
    pub tx: UnsignedTx,
    /// The signed, encoded transaction, kept so it can be rebroadcast.
    pub raw: Bytes,
    /// Max fee per gas the transaction was signed with.
    pub max_fee_per_gas: u128,
    /// Max priority fee per gas the transaction was signed with.
    pub max_priority_fee_per_gas: u128,
    /// Current status.
    pub status: SubmissionStatus,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

/// Append-mostly log of signed transactions.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends a record. Must be durable before the transaction is broadcast.
    async fn record(&self, record: &SubmissionRecord) -> Result<(), DomainError>;

    /// Updates the status of the record for `tx_hash`.
    async fn set_status(&self, tx_hash: B256, status: SubmissionStatus)
    -> Result<(), DomainError>;

    /// Pending records for one workflow step, oldest first.
    async fn pending_for_step(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
    ) -> Result<Vec<SubmissionRecord>, DomainError>;

    /// Pending records with a nonce at or above `from_nonce`, ordered by nonce.
    async fn pending_from_nonce(&self, from_nonce: u64)
    -> Result<Vec<SubmissionRecord>, DomainError>;
}
