//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization, pragmas and additive migrations
//! - The combo store (upsert, closure, backfill patches)
//! - The position snapshot store used as the intent baseline

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, MigrationError, MigrationPolicy, StoreConfig};
pub use repo::{Repository, UpsertOutcome};
