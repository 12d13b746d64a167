//! `PostgreSQL` implementation of the `IdempotencyLedger` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use snacks_core::error::DomainError;
use snacks_core::ledger::IdempotencyLedger;
use snacks_core::workflow::{
    IdempotencyKey, ProgressEntry, StepKind, StepResult, WorkflowRequest, WorkflowStatus,
};

use crate::{corrupt, db_error};

/// PostgreSQL-backed idempotency ledger.
///
/// Step completion relies on the `(idempotency_key, step)` primary key of
/// `workflow_steps`, so two writers can never both complete a step.
#[derive(Debug, Clone)]
pub struct PgIdempotencyLedger {
    pool: PgPool,
}

impl PgIdempotencyLedger {
    /// Creates a new `PgIdempotencyLedger`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, key: &IdempotencyKey) -> Result<Option<ProgressEntry>, DomainError> {
        let row = sqlx::query(
            "SELECT request, status, failure_reason, updated_at
             FROM workflow_progress WHERE idempotency_key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        match row {
            Some(row) => Ok(Some(self.entry_from_row(key.clone(), &row).await?)),
            None => Ok(None),
        }
    }

    async fn entry_from_row(
        &self,
        key: IdempotencyKey,
        row: &PgRow,
    ) -> Result<ProgressEntry, DomainError> {
        let request: serde_json::Value = row.try_get("request").map_err(db_error)?;
        let request: WorkflowRequest =
            serde_json::from_value(request).map_err(|e| corrupt("workflow request", e))?;
        let status: String = row.try_get("status").map_err(db_error)?;
        let reason: Option<String> = row.try_get("failure_reason").map_err(db_error)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_error)?;
        let completed = self.completed_steps(&key).await?;
        Ok(ProgressEntry {
            key,
            request,
            status: decode_status(&status, reason)?,
            completed,
            updated_at,
        })
    }

    async fn completed_steps(
        &self,
        key: &IdempotencyKey,
    ) -> Result<BTreeMap<StepKind, StepResult>, DomainError> {
        let rows = sqlx::query("SELECT step, result FROM workflow_steps WHERE idempotency_key = $1")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        let mut completed = BTreeMap::new();
        for row in rows {
            let index: i16 = row.try_get("step").map_err(db_error)?;
            let step = StepKind::from_index(index).ok_or_else(|| corrupt("step index", index))?;
            let result: serde_json::Value = row.try_get("result").map_err(db_error)?;
            let result: StepResult =
                serde_json::from_value(result).map_err(|e| corrupt("step result", e))?;
            completed.insert(step, result);
        }
        Ok(completed)
    }

    async fn set_status(
        &self,
        key: &IdempotencyKey,
        status: &str,
        reason: Option<&str>,
    ) -> Result<(), DomainError> {
        let updated = sqlx::query(
            "UPDATE workflow_progress
             SET status = $2, failure_reason = $3, updated_at = NOW()
             WHERE idempotency_key = $1",
        )
        .bind(key.as_str())
        .bind(status)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("workflow {key}")));
        }
        Ok(())
    }
}

fn decode_status(status: &str, reason: Option<String>) -> Result<WorkflowStatus, DomainError> {
    match status {
        "pending" => Ok(WorkflowStatus::Pending),
        "completed" => Ok(WorkflowStatus::Completed),
        "failed" => Ok(WorkflowStatus::Failed {
            reason: reason.unwrap_or_default(),
        }),
        other => Err(corrupt("workflow status", other)),
    }
}

#[async_trait]
impl IdempotencyLedger for PgIdempotencyLedger {
    async fn begin(&self, request: &WorkflowRequest) -> Result<ProgressEntry, DomainError> {
        let key = request.idempotency_key();
        let payload = serde_json::to_value(request)
            .map_err(|e| DomainError::Infrastructure(format!("serialize request: {e}")))?;
        sqlx::query(
            "INSERT INTO workflow_progress (idempotency_key, request, status)
             VALUES ($1, $2, 'pending')
             ON CONFLICT (idempotency_key) DO UPDATE
                SET status = 'pending', failure_reason = NULL, updated_at = NOW()
                WHERE workflow_progress.status = 'failed'",
        )
        .bind(key.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        debug!(idempotency_key = %key, "ledger entry opened");
        self.load(&key)
            .await?
            .ok_or_else(|| DomainError::Infrastructure(format!("workflow {key} vanished")))
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
        result: &StepResult,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_value(result)
            .map_err(|e| DomainError::Infrastructure(format!("serialize step result: {e}")))?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT seq FROM workflow_progress WHERE idempotency_key = $1 FOR UPDATE",
        )
        .bind(key.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;
        if exists.is_none() {
            return Err(DomainError::NotFound(format!("workflow {key}")));
        }

        let inserted = sqlx::query(
            "INSERT INTO workflow_steps (idempotency_key, step, result)
             VALUES ($1, $2, $3)
             ON CONFLICT (idempotency_key, step) DO NOTHING",
        )
        .bind(key.as_str())
        .bind(step.index())
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        if inserted.rows_affected() == 0 {
            return Err(DomainError::ConcurrencyConflict {
                key: key.to_string(),
                detail: format!("{step} already completed"),
            });
        }

        sqlx::query("UPDATE workflow_progress SET updated_at = NOW() WHERE idempotency_key = $1")
            .bind(key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        debug!(idempotency_key = %key, %step, "step recorded");
        Ok(())
    }

    async fn fail(&self, key: &IdempotencyKey, reason: &str) -> Result<(), DomainError> {
        self.set_status(key, "failed", Some(reason)).await
    }

    async fn finish(&self, key: &IdempotencyKey) -> Result<(), DomainError> {
        self.set_status(key, "completed", None).await
    }

    async fn status(&self, key: &IdempotencyKey) -> Result<Option<WorkflowStatus>, DomainError> {
        let row = sqlx::query(
            "SELECT status, failure_reason FROM workflow_progress WHERE idempotency_key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status").map_err(db_error)?;
        let reason: Option<String> = row.try_get("failure_reason").map_err(db_error)?;
        decode_status(&status, reason).map(Some)
    }

    async fn unfinished(&self) -> Result<Vec<ProgressEntry>, DomainError> {
        let rows = sqlx::query(
            "SELECT idempotency_key, request, status, failure_reason, updated_at
             FROM workflow_progress WHERE status = 'pending' ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row.try_get("idempotency_key").map_err(db_error)?;
            entries.push(self.entry_from_row(IdempotencyKey::from_raw(key), row).await?);
        }
        Ok(entries)
    }
}
