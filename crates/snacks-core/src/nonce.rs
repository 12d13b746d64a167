//! Nonce allocation abstractions.

use async_trait::async_trait;

use crate::error::DomainError;

/// Hands out transaction nonces for the deployer account.
///
/// Implementations must hand out values with no gaps and no duplicates
/// across all concurrent callers in the process. A released nonce is handed
/// out again, lowest first, before any fresh one.
#[async_trait]
pub trait NonceAllocator: Send + Sync {
    /// Allocates the next nonce.
    async fn allocate(&self) -> Result<u64, DomainError>;

    /// Returns a nonce that was allocated but never broadcast.
    async fn release(&self, nonce: u64);

    /// Returns one past the highest nonce ever handed out.
    async fn peek(&self) -> u64;
}

/// Durable storage for the nonce high-water mark: one past the highest nonce
/// ever handed out.
#[async_trait]
pub trait NonceWatermark: Send + Sync {
    /// Loads the persisted high-water mark, if any.
    async fn load(&self) -> Result<Option<u64>, DomainError>;

    /// Persists `next` as the new high-water mark. Never moves it backwards.
    async fn store(&self, next: u64) -> Result<(), DomainError>;
}
