//! In-memory ledger and audit log. Per-key semantics match the Postgres
//! implementations closely enough for engine tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy_primitives::B256;
use async_trait::async_trait;
use chrono::Utc;
use snacks_core::audit::{AuditLog, SubmissionPurpose, SubmissionRecord, SubmissionStatus};
use snacks_core::error::DomainError;
use snacks_core::ledger::IdempotencyLedger;
use snacks_core::workflow::{
    IdempotencyKey, ProgressEntry, StepKind, StepResult, WorkflowRequest, WorkflowStatus,
};

/// An idempotency ledger held in a mutex-guarded map. Clone the entries out
/// with [`InMemoryLedger::entry`] to assert on progress.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<BTreeMap<IdempotencyKey, (u64, ProgressEntry)>>,
    next_seq: Mutex<u64>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the entry for `key`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn entry(&self, key: &IdempotencyKey) -> Option<ProgressEntry> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, entry)| entry.clone())
    }

    fn missing(key: &IdempotencyKey) -> DomainError {
        DomainError::NotFound(format!("ledger entry {key}"))
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryLedger {
    async fn begin(&self, request: &WorkflowRequest) -> Result<ProgressEntry, DomainError> {
        let key = request.idempotency_key();
        let mut entries = self.entries.lock().unwrap();
        if let Some((_, entry)) = entries.get_mut(&key) {
            if matches!(entry.status, WorkflowStatus::Failed { .. }) {
                entry.status = WorkflowStatus::Pending;
                entry.updated_at = Utc::now();
            }
            return Ok(entry.clone());
        }
        let mut seq = self.next_seq.lock().unwrap();
        *seq += 1;
        let entry = ProgressEntry::new(request.clone(), Utc::now());
        entries.insert(key, (*seq, entry.clone()));
        Ok(entry)
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
        result: &StepResult,
    ) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().unwrap();
        let (_, entry) = entries.get_mut(key).ok_or_else(|| Self::missing(key))?;
        if let Some(existing) = entry.completed.get(&step) {
            return Err(DomainError::ConcurrencyConflict {
                key: key.to_string(),
                detail: format!("{step} already completed with {existing:?}"),
            });
        }
        entry.completed.insert(step, result.clone());
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(&self, key: &IdempotencyKey, reason: &str) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().unwrap();
        let (_, entry) = entries.get_mut(key).ok_or_else(|| Self::missing(key))?;
        entry.status = WorkflowStatus::Failed {
            reason: reason.to_owned(),
        };
        Ok(())
    }

    async fn finish(&self, key: &IdempotencyKey) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().unwrap();
        let (_, entry) = entries.get_mut(key).ok_or_else(|| Self::missing(key))?;
        entry.status = WorkflowStatus::Completed;
        Ok(())
    }

    async fn status(&self, key: &IdempotencyKey) -> Result<Option<WorkflowStatus>, DomainError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, entry)| entry.status.clone()))
    }

    async fn unfinished(&self) -> Result<Vec<ProgressEntry>, DomainError> {
        let entries = self.entries.lock().unwrap();
        let mut pending: Vec<_> = entries
            .values()
            .filter(|(_, entry)| entry.status == WorkflowStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|(seq, _)| *seq);
        Ok(pending.into_iter().map(|(_, entry)| entry).collect())
    }
}

/// An audit log that keeps every record in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<SubmissionRecord>>,
    fail_next_record: AtomicBool,
}

impl InMemoryAuditLog {
    /// Creates an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Makes the next `record` call fail with `Infrastructure` without
    /// storing anything.
    pub fn fail_next_record(&self) {
        self.fail_next_record.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, record: &SubmissionRecord) -> Result<(), DomainError> {
        if self.fail_next_record.swap(false, Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("audit log unavailable".into()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        tx_hash: B256,
        status: SubmissionStatus,
    ) -> Result<(), DomainError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.tx_hash == tx_hash)
            .ok_or_else(|| DomainError::NotFound(format!("submission {tx_hash}")))?;
        record.status = status;
        Ok(())
    }

    async fn pending_for_step(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
    ) -> Result<Vec<SubmissionRecord>, DomainError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == SubmissionStatus::Pending)
            .filter(|r| {
                matches!(&r.purpose, SubmissionPurpose::Step { key: k, step: s } if k == key && *s == step)
            })
            .cloned()
            .collect())
    }

    async fn pending_from_nonce(
        &self,
        from_nonce: u64,
    ) -> Result<Vec<SubmissionRecord>, DomainError> {
        let mut pending: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == SubmissionStatus::Pending && r.nonce >= from_nonce)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.nonce);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WorkflowRequest {
        WorkflowRequest::MintAndBind {
            wallet: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_second_completion_of_a_step_conflicts() {
        let ledger = InMemoryLedger::new();
        let entry = ledger.begin(&request()).await.unwrap();
        let result = StepResult::EvolutionSkipped;

        ledger
            .complete(&entry.key, StepKind::MintAsset, &result)
            .await
            .unwrap();
        let err = ledger
            .complete(&entry.key, StepKind::MintAsset, &result)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn test_begin_reopens_failed_entry_and_keeps_progress() {
        let ledger = InMemoryLedger::new();
        let entry = ledger.begin(&request()).await.unwrap();
        ledger
            .complete(&entry.key, StepKind::MintAsset, &StepResult::EvolutionSkipped)
            .await
            .unwrap();
        ledger.fail(&entry.key, "reverted").await.unwrap();

        let reopened = ledger.begin(&request()).await.unwrap();

        assert_eq!(reopened.status, WorkflowStatus::Pending);
        assert!(reopened.is_complete(StepKind::MintAsset));
    }
}
