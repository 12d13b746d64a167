//! Snacks Workflow — ordered, resumable asset lifecycle workflows.
//!
//! The engine runs one workflow request at a time against the idempotency
//! ledger, the asset store and the transaction submitter. The worker owns
//! the engine and drains an unbounded queue fed by request handlers.

pub mod application;
pub mod domain;
