//! `PostgreSQL` implementation of the `AuditLog` trait.

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use snacks_core::audit::{AuditLog, SubmissionPurpose, SubmissionRecord, SubmissionStatus};
use snacks_core::chain::UnsignedTx;
use snacks_core::error::DomainError;
use snacks_core::workflow::{IdempotencyKey, StepKind};

use crate::{corrupt, db_error};

const COLUMNS: &str = "id, idempotency_key, step, nonce, tx_hash, to_address, input, value,
    gas_limit, raw, max_fee_per_gas, max_priority_fee_per_gas, status, recorded_at";

/// PostgreSQL-backed submission audit log.
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    /// Creates a new `PgAuditLog`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_db_nonce(nonce: u64) -> Result<i64, DomainError> {
    i64::try_from(nonce).map_err(|_| DomainError::Validation(format!("nonce {nonce} out of range")))
}

fn decode_record(row: &PgRow) -> Result<SubmissionRecord, DomainError> {
    let key: Option<String> = row.try_get("idempotency_key").map_err(db_error)?;
    let step: Option<i16> = row.try_get("step").map_err(db_error)?;
    let purpose = match (key, step) {
        (Some(key), Some(index)) => SubmissionPurpose::Step {
            key: IdempotencyKey::from_raw(key),
            step: StepKind::from_index(index).ok_or_else(|| corrupt("step index", index))?,
        },
        (None, None) => SubmissionPurpose::Burn,
        _ => return Err(corrupt("submission purpose", "key and step must both be set")),
    };

    let nonce: i64 = row.try_get("nonce").map_err(db_error)?;
    let tx_hash: Vec<u8> = row.try_get("tx_hash").map_err(db_error)?;
    let to: Vec<u8> = row.try_get("to_address").map_err(db_error)?;
    let input: Vec<u8> = row.try_get("input").map_err(db_error)?;
    let value: String = row.try_get("value").map_err(db_error)?;
    let gas_limit: i64 = row.try_get("gas_limit").map_err(db_error)?;
    let raw: Vec<u8> = row.try_get("raw").map_err(db_error)?;
    let max_fee: String = row.try_get("max_fee_per_gas").map_err(db_error)?;
    let priority_fee: String = row.try_get("max_priority_fee_per_gas").map_err(db_error)?;
    let status: String = row.try_get("status").map_err(db_error)?;

    if tx_hash.len() != 32 {
        return Err(corrupt("tx hash", format!("{} bytes", tx_hash.len())));
    }
    if to.len() != 20 {
        return Err(corrupt("to address", format!("{} bytes", to.len())));
    }

    Ok(SubmissionRecord {
        id: row.try_get::<Uuid, _>("id").map_err(db_error)?,
        purpose,
        nonce: u64::try_from(nonce).map_err(|e| corrupt("nonce", e))?,
        tx_hash: B256::from_slice(&tx_hash),
        tx: UnsignedTx {
            to: Address::from_slice(&to),
            input: Bytes::from(input),
            value: value.parse::<U256>().map_err(|e| corrupt("value", e))?,
            gas_limit: u64::try_from(gas_limit).map_err(|e| corrupt("gas limit", e))?,
        },
        raw: Bytes::from(raw),
        max_fee_per_gas: max_fee.parse().map_err(|e| corrupt("max fee", e))?,
        max_priority_fee_per_gas: priority_fee
            .parse()
            .map_err(|e| corrupt("priority fee", e))?,
        status: SubmissionStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
        recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at").map_err(db_error)?,
    })
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record(&self, record: &SubmissionRecord) -> Result<(), DomainError> {
        let (key, step) = match &record.purpose {
            SubmissionPurpose::Step { key, step } => (Some(key.as_str()), Some(step.index())),
            SubmissionPurpose::Burn => (None, None),
        };
        let gas_limit = i64::try_from(record.tx.gas_limit)
            .map_err(|_| DomainError::Validation("gas limit out of range".into()))?;
        sqlx::query(&format!(
            "INSERT INTO submissions ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(record.id)
        .bind(key)
        .bind(step)
        .bind(to_db_nonce(record.nonce)?)
        .bind(record.tx_hash.as_slice())
        .bind(record.tx.to.as_slice())
        .bind(&record.tx.input[..])
        .bind(record.tx.value.to_string())
        .bind(gas_limit)
        .bind(&record.raw[..])
        .bind(record.max_fee_per_gas.to_string())
        .bind(record.max_priority_fee_per_gas.to_string())
        .bind(record.status.as_str())
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn set_status(
        &self,
        tx_hash: B256,
        status: SubmissionStatus,
    ) -> Result<(), DomainError> {
        let updated = sqlx::query("UPDATE submissions SET status = $2 WHERE tx_hash = $1")
            .bind(tx_hash.as_slice())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("submission {tx_hash}")));
        }
        Ok(())
    }

    async fn pending_for_step(
        &self,
        key: &IdempotencyKey,
        step: StepKind,
    ) -> Result<Vec<SubmissionRecord>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM submissions
             WHERE idempotency_key = $1 AND step = $2 AND status = 'pending'
             ORDER BY recorded_at, max_fee_per_gas::NUMERIC"
        ))
        .bind(key.as_str())
        .bind(step.index())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(decode_record).collect()
    }

    async fn pending_from_nonce(
        &self,
        from_nonce: u64,
    ) -> Result<Vec<SubmissionRecord>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM submissions
             WHERE nonce >= $1 AND status = 'pending'
             ORDER BY nonce, recorded_at"
        ))
        .bind(to_db_nonce(from_nonce)?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(decode_record).collect()
    }
}
