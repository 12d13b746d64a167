//! `PostgreSQL` implementation of the `NonceWatermark` trait.

use alloy_primitives::Address;
use async_trait::async_trait;
use sqlx::PgPool;

use snacks_core::error::DomainError;
use snacks_core::nonce::NonceWatermark;

use crate::{corrupt, db_error};

/// Nonce high-water mark for one signing account.
#[derive(Debug, Clone)]
pub struct PgNonceWatermark {
    pool: PgPool,
    account: String,
}

impl PgNonceWatermark {
    /// Creates a watermark keyed by `account`.
    #[must_use]
    pub fn new(pool: PgPool, account: Address) -> Self {
        Self {
            pool,
            account: account.to_checksum(None),
        }
    }
}

#[async_trait]
impl NonceWatermark for PgNonceWatermark {
    async fn load(&self) -> Result<Option<u64>, DomainError> {
        let next: Option<i64> =
            sqlx::query_scalar("SELECT next_nonce FROM nonce_watermarks WHERE account = $1")
                .bind(&self.account)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        next.map(|n| u64::try_from(n).map_err(|e| corrupt("nonce watermark", e)))
            .transpose()
    }

    async fn store(&self, next: u64) -> Result<(), DomainError> {
        let next = i64::try_from(next)
            .map_err(|_| DomainError::Validation(format!("nonce watermark {next} out of range")))?;
        sqlx::query(
            "INSERT INTO nonce_watermarks (account, next_nonce) VALUES ($1, $2)
             ON CONFLICT (account) DO UPDATE
                SET next_nonce = GREATEST(nonce_watermarks.next_nonce, EXCLUDED.next_nonce),
                    updated_at = NOW()",
        )
        .bind(&self.account)
        .bind(next)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
