//! Application layer for workflows.

pub mod engine;
pub mod recovery;
pub mod worker;
