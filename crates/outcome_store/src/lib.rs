//! Durable outcome history backed by SQLite.

pub mod sqlite;

pub use sqlite::SqliteOutcomeStore;
