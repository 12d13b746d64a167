//! `PostgreSQL` implementation of the `AssetStore` trait.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use snacks_core::asset::{AssetRecord, AttestationRecord, LifecycleState, Restaurant};
use snacks_core::error::DomainError;
use snacks_core::store::AssetStore;
use snacks_core::wallet::WalletAddress;

use crate::{corrupt, db_error};

/// PostgreSQL-backed asset records and restaurant lookup.
#[derive(Debug, Clone)]
pub struct PgAssetStore {
    pool: PgPool,
}

impl PgAssetStore {
    /// Creates a new `PgAssetStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_record(wallet: WalletAddress, row: &PgRow) -> Result<AssetRecord, DomainError> {
    let token_id: Option<String> = row.try_get("token_id").map_err(db_error)?;
    let bound_account: Option<String> = row.try_get("bound_account").map_err(db_error)?;
    let state: String = row.try_get("state").map_err(db_error)?;
    let visited: serde_json::Value = row.try_get("visited_restaurants").map_err(db_error)?;
    let attestations: serde_json::Value = row.try_get("attestations").map_err(db_error)?;

    Ok(AssetRecord {
        wallet,
        token_id: token_id
            .map(|t| t.parse::<U256>().map_err(|e| corrupt("token id", e)))
            .transpose()?,
        bound_account: bound_account
            .map(|a| a.parse::<Address>().map_err(|e| corrupt("bound account", e)))
            .transpose()?,
        metadata_pointer: row.try_get("metadata_pointer").map_err(db_error)?,
        state: LifecycleState::parse(&state).ok_or_else(|| corrupt("lifecycle state", &state))?,
        visited_restaurants: serde_json::from_value(visited)
            .map_err(|e| corrupt("visited restaurants", e))?,
        attestations: serde_json::from_value::<Vec<AttestationRecord>>(attestations)
            .map_err(|e| corrupt("attestations", e))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_error)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_error)?,
    })
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::Infrastructure(format!("serialize: {e}")))
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn get_asset_record(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<AssetRecord>, DomainError> {
        let row = sqlx::query(
            "SELECT token_id, bound_account, metadata_pointer, state, visited_restaurants,
                    attestations, created_at, updated_at
             FROM asset_records WHERE wallet = $1",
        )
        .bind(wallet.checksummed())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(|row| decode_record(*wallet, &row)).transpose()
    }

    async fn put_asset_record(&self, record: &AssetRecord) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO asset_records (wallet, token_id, bound_account, metadata_pointer, state,
                    visited_restaurants, attestations, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (wallet) DO UPDATE SET
                token_id = EXCLUDED.token_id,
                bound_account = EXCLUDED.bound_account,
                metadata_pointer = EXCLUDED.metadata_pointer,
                state = EXCLUDED.state,
                visited_restaurants = EXCLUDED.visited_restaurants,
                attestations = EXCLUDED.attestations,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(record.wallet.checksummed())
        .bind(record.token_id.map(|t| t.to_string()))
        .bind(record.bound_account.map(|a| a.to_checksum(None)))
        .bind(record.metadata_pointer.as_deref())
        .bind(record.state.as_str())
        .bind(to_json(&record.visited_restaurants)?)
        .bind(to_json(&record.attestations)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_restaurant(&self, restaurant_id: &str) -> Result<Option<Restaurant>, DomainError> {
        let row = sqlx::query("SELECT id, name, attestation_pointer FROM restaurants WHERE id = $1")
            .bind(restaurant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Restaurant {
            id: row.try_get("id").map_err(db_error)?,
            name: row.try_get("name").map_err(db_error)?,
            attestation_pointer: row.try_get("attestation_pointer").map_err(db_error)?,
        }))
    }
}
