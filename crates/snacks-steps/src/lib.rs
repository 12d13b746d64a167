//! Snacks Steps — the four chain operations of the asset lifecycle.
//!
//! Every step is a pure builder from the current asset state to an
//! [`UnsignedTx`](snacks_core::chain::UnsignedTx) plus an extractor from the
//! receipt to a [`StepResult`](snacks_core::workflow::StepResult). Nothing in
//! this crate signs, sends or persists.

pub mod bind_account;
pub mod contracts;
pub mod error;
pub mod evolve_asset;
pub mod mint_asset;
pub mod mint_attestation;
pub mod pointer;
pub mod token_bound;

pub use contracts::ContractSet;
pub use error::StepError;
pub use pointer::{BasePointerPolicy, RandomBasePointer, next_pointer};
pub use token_bound::token_bound_address;

/// Gas limit for every lifecycle transaction.
pub const STEP_GAS_LIMIT: u64 = 1_000_000;
