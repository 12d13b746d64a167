//! Shared test fakes and utilities for the Snacks orchestration engine.

mod chain;
mod clock;
mod ledger;
mod lifecycle;
mod nonce;
mod rng;
mod store;

pub use chain::{FakeChain, SentTx};
pub use clock::FixedClock;
pub use ledger::{InMemoryAuditLog, InMemoryLedger};
pub use lifecycle::{
    asset_token_id, lifecycle_chain, lifecycle_chain_with_registry_answer, test_contracts,
};
pub use nonce::{CountingNonces, InMemoryWatermark};
pub use rng::MockRng;
pub use store::{FailingAssetStore, InMemoryAssetStore};
