//! Persistence collaborator abstraction.

use async_trait::async_trait;

use crate::asset::{AssetRecord, Restaurant};
use crate::error::DomainError;
use crate::wallet::WalletAddress;

/// Key-value access to user asset records and restaurant configuration.
///
/// Only the workflow worker writes asset records, so a plain read followed
/// by a write cannot lose updates.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Loads the asset record for `wallet`.
    async fn get_asset_record(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<AssetRecord>, DomainError>;

    /// Inserts or replaces the asset record keyed by its wallet.
    async fn put_asset_record(&self, record: &AssetRecord) -> Result<(), DomainError>;

    /// Loads a restaurant by id.
    async fn get_restaurant(&self, restaurant_id: &str) -> Result<Option<Restaurant>, DomainError>;
}
