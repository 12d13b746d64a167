//! Startup recovery: repair nonce gaps, then requeue unfinished workflows.

use snacks_chain::{GapRepair, TransactionSubmitter};
use snacks_core::error::DomainError;
use snacks_core::ledger::IdempotencyLedger;
use snacks_core::nonce::NonceAllocator;
use tracing::{info, instrument, warn};

use crate::application::worker::OrchestratorHandle;

/// What startup recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Nonces rebroadcast or burned.
    pub gaps: GapRepair,
    /// Unfinished workflows put back on the queue.
    pub requeued: usize,
}

/// Runs before new requests are accepted.
///
/// Gap repair comes first so that requeued workflows resume on a nonce
/// sequence the chain can make progress on.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the chain, audit log or ledger
/// cannot be read, or the worker has already stopped.
#[instrument(skip_all)]
pub async fn recover(
    submitter: &TransactionSubmitter,
    nonces: &dyn NonceAllocator,
    ledger: &dyn IdempotencyLedger,
    handle: &OrchestratorHandle,
) -> Result<RecoveryReport, DomainError> {
    let next = nonces.peek().await;
    let gaps = submitter.repair_nonce_gaps(next).await?;
    if !gaps.burned.is_empty() {
        warn!(burned = ?gaps.burned, "burned nonces that were allocated but never signed");
    }

    let unfinished = ledger.unfinished().await?;
    for entry in &unfinished {
        handle.enqueue(entry.request.clone())?;
    }
    info!(
        rebroadcast = gaps.rebroadcast.len(),
        burned = gaps.burned.len(),
        requeued = unfinished.len(),
        "startup recovery finished"
    );
    Ok(RecoveryReport {
        gaps,
        requeued: unfinished.len(),
    })
}
