//! Test asset stores — mock `AssetStore` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use snacks_core::asset::{AssetRecord, Restaurant};
use snacks_core::error::DomainError;
use snacks_core::store::AssetStore;
use snacks_core::wallet::WalletAddress;

/// An asset store backed by hash maps. Counts writes so tests can assert
/// how often the worker persisted a record.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    records: Mutex<HashMap<WalletAddress, AssetRecord>>,
    restaurants: Mutex<HashMap<String, Restaurant>>,
    puts: Mutex<usize>,
}

impl InMemoryAssetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a restaurant, builder style.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_restaurant(self, restaurant: Restaurant) -> Self {
        self.restaurants
            .lock()
            .unwrap()
            .insert(restaurant.id.clone(), restaurant);
        self
    }

    /// Seeds an asset record, builder style.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_record(self, record: AssetRecord) -> Self {
        self.records.lock().unwrap().insert(record.wallet, record);
        self
    }

    /// Returns a snapshot of the record for `wallet`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn record(&self, wallet: &WalletAddress) -> Option<AssetRecord> {
        self.records.lock().unwrap().get(wallet).cloned()
    }

    /// Number of `put_asset_record` calls so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_count(&self) -> usize {
        *self.puts.lock().unwrap()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get_asset_record(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<AssetRecord>, DomainError> {
        Ok(self.records.lock().unwrap().get(wallet).cloned())
    }

    async fn put_asset_record(&self, record: &AssetRecord) -> Result<(), DomainError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.wallet, record.clone());
        *self.puts.lock().unwrap() += 1;
        Ok(())
    }

    async fn get_restaurant(&self, restaurant_id: &str) -> Result<Option<Restaurant>, DomainError> {
        Ok(self.restaurants.lock().unwrap().get(restaurant_id).cloned())
    }
}

/// An asset store that always returns an infrastructure error. Useful for
/// testing that store outages leave workflows retryable.
#[derive(Debug)]
pub struct FailingAssetStore;

#[async_trait]
impl AssetStore for FailingAssetStore {
    async fn get_asset_record(
        &self,
        _wallet: &WalletAddress,
    ) -> Result<Option<AssetRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn put_asset_record(&self, _record: &AssetRecord) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn get_restaurant(
        &self,
        _restaurant_id: &str,
    ) -> Result<Option<Restaurant>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
