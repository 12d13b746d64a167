//! Snacks Chain — everything that touches the deployer account.
//!
//! The nonce sequencer owns the account's transaction counter, the submitter
//! signs, broadcasts and confirms transactions, and the RPC client adapts an
//! alloy provider to the `ChainClient` seam.

pub mod account;
pub mod error;
pub mod rpc;
pub mod sequencer;
pub mod submitter;

pub use account::{DeployerAccount, SignedTx};
pub use error::SubmitError;
pub use rpc::RpcChainClient;
pub use sequencer::NonceSequencer;
pub use submitter::{FeeSchedule, GapRepair, Submitted, SubmitterConfig, TransactionSubmitter};
