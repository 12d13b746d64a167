//! Snacks Core — shared domain abstractions.
//!
//! This crate defines the records, workflow vocabulary and collaborator
//! traits that the chain, step, workflow and store crates depend on. It
//! contains no infrastructure code.

pub mod asset;
pub mod audit;
pub mod chain;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod nonce;
pub mod rng;
pub mod store;
pub mod wallet;
pub mod workflow;
