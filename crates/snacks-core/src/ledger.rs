//! Idempotency ledger abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::workflow::{
    IdempotencyKey, ProgressEntry, StepKind, StepResult, WorkflowRequest, WorkflowStatus,
};

/// Durable, per-key linearizable record of workflow progress.
///
/// `complete` is the single source of truth for whether a step's on-chain
/// effect happened. Implementations must make it insert-if-absent: a second
/// completion of the same step returns `DomainError::ConcurrencyConflict`.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Opens the entry for `request`, creating it if absent and re-opening it
    /// if it previously failed. Completed entries are returned unchanged.
    async fn begin(&self, request: &WorkflowRequest) -> Result<ProgressEntry, DomainError>;

    /// Records `step` as done with its captured `result`.
    async fn complete(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
        result: &StepResult,
    ) -> Result<(), DomainError>;

    /// Marks the entry failed-terminal with `reason`.
    async fn fail(&self, key: &IdempotencyKey, reason: &str) -> Result<(), DomainError>;

    /// Marks the entry completed.
    async fn finish(&self, key: &IdempotencyKey) -> Result<(), DomainError>;

    /// Returns the status of `key`, or `None` if it was never begun.
    async fn status(&self, key: &IdempotencyKey) -> Result<Option<WorkflowStatus>, DomainError>;

    /// Returns every pending entry, oldest first.
    async fn unfinished(&self) -> Result<Vec<ProgressEntry>, DomainError>;
}
