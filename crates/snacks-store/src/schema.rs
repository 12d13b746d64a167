//! Database schema.
//!
//! Migrations live in the workspace `migrations/` directory and are embedded
//! at compile time.

use sqlx::migrate::Migrator;

/// Embedded migrations; run once at startup.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
