//! Snacks API — HTTP surface over the transaction orchestration engine.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
