//! Snacks Store — `PostgreSQL` implementations of the core persistence traits.

pub mod pg_asset_store;
pub mod pg_audit_log;
pub mod pg_ledger;
pub mod pg_nonce_watermark;
pub mod schema;

pub use pg_asset_store::PgAssetStore;
pub use pg_audit_log::PgAuditLog;
pub use pg_ledger::PgIdempotencyLedger;
pub use pg_nonce_watermark::PgNonceWatermark;

use snacks_core::error::DomainError;

/// Maps a driver error onto the retryable infrastructure variant.
pub(crate) fn db_error(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database: {err}"))
}

/// A stored value that does not decode is corruption, not a transient fault.
pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> DomainError {
    DomainError::Consistency(format!("stored {what} is invalid: {detail}"))
}
