//! Test nonce sources.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use snacks_core::error::DomainError;
use snacks_core::nonce::{NonceAllocator, NonceWatermark};

/// A deterministic allocator that counts up from a starting value without
/// consulting any chain. Released nonces are handed out again first.
#[derive(Debug)]
pub struct CountingNonces {
    next: Mutex<u64>,
    released: Mutex<BTreeSet<u64>>,
}

impl CountingNonces {
    /// Creates an allocator whose first nonce is `start`.
    #[must_use]
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: Mutex::new(start),
            released: Mutex::new(BTreeSet::new()),
        }
    }
}

#[async_trait]
impl NonceAllocator for CountingNonces {
    async fn allocate(&self) -> Result<u64, DomainError> {
        if let Some(nonce) = self.released.lock().unwrap().pop_first() {
            return Ok(nonce);
        }
        let mut next = self.next.lock().unwrap();
        let nonce = *next;
        *next += 1;
        Ok(nonce)
    }

    async fn release(&self, nonce: u64) {
        self.released.lock().unwrap().insert(nonce);
    }

    async fn peek(&self) -> u64 {
        *self.next.lock().unwrap()
    }
}

/// A watermark kept in memory; survives "restarts" that reuse the instance.
#[derive(Debug, Default)]
pub struct InMemoryWatermark {
    value: Mutex<Option<u64>>,
}

impl InMemoryWatermark {
    /// Creates a watermark preset to `next`.
    #[must_use]
    pub fn at(next: u64) -> Self {
        Self {
            value: Mutex::new(Some(next)),
        }
    }

    /// Returns the stored value.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn value(&self) -> Option<u64> {
        *self.value.lock().unwrap()
    }
}

#[async_trait]
impl NonceWatermark for InMemoryWatermark {
    async fn load(&self) -> Result<Option<u64>, DomainError> {
        Ok(*self.value.lock().unwrap())
    }

    async fn store(&self, next: u64) -> Result<(), DomainError> {
        let mut value = self.value.lock().unwrap();
        *value = Some(value.map_or(next, |current| current.max(next)));
        Ok(())
    }
}
