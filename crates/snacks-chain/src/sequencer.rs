//! Nonce sequencer for the deployer account.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use snacks_core::chain::ChainClient;
use snacks_core::error::DomainError;
use snacks_core::nonce::{NonceAllocator, NonceWatermark};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Hands out nonces from an in-memory counter.
///
/// The chain is queried exactly once, in [`NonceSequencer::seed`]. Every
/// later allocation increments the counter inside one critical section and
/// persists the new high-water mark before returning, so a restart never
/// reuses a nonce that was already handed out. Released nonces are reused
/// first; one still released at shutdown is burned by gap repair.
pub struct NonceSequencer {
    counter: Mutex<Counter>,
    watermark: Arc<dyn NonceWatermark>,
}

#[derive(Debug)]
struct Counter {
    next: u64,
    released: BTreeSet<u64>,
}

impl NonceSequencer {
    /// Seeds the counter from `max(chain pending count, persisted mark)`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the chain or the watermark
    /// store cannot be read.
    pub async fn seed(
        chain: &dyn ChainClient,
        deployer: Address,
        watermark: Arc<dyn NonceWatermark>,
    ) -> Result<Self, DomainError> {
        let on_chain = chain.transaction_count(deployer).await?;
        let persisted = watermark.load().await?;
        let next = persisted.map_or(on_chain, |mark| mark.max(on_chain));
        info!(%deployer, on_chain, ?persisted, next, "nonce sequencer seeded");
        Ok(Self {
            counter: Mutex::new(Counter {
                next,
                released: BTreeSet::new(),
            }),
            watermark,
        })
    }
}

impl fmt::Debug for NonceSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceSequencer").finish_non_exhaustive()
    }
}

#[async_trait]
impl NonceAllocator for NonceSequencer {
    async fn allocate(&self) -> Result<u64, DomainError> {
        let mut counter = self.counter.lock().await;
        if let Some(nonce) = counter.released.pop_first() {
            debug!(nonce, "released nonce reallocated");
            return Ok(nonce);
        }
        let nonce = counter.next;
        self.watermark.store(nonce + 1).await?;
        counter.next = nonce + 1;
        debug!(nonce, "nonce allocated");
        Ok(nonce)
    }

    async fn release(&self, nonce: u64) {
        let mut counter = self.counter.lock().await;
        if nonce >= counter.next || !counter.released.insert(nonce) {
            warn!(nonce, next = counter.next, "ignoring release of a nonce not held");
            return;
        }
        debug!(nonce, "nonce released");
    }

    async fn peek(&self) -> u64 {
        self.counter.lock().await.next
    }
}
