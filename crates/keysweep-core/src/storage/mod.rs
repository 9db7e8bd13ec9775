//! # Storage Module
//!
//! Persistent installer database backed by redb.

mod redb_database;

pub use redb_database::{RedbDatabase, RedbStaging, RedbView};
