//! # Dripcast DB
//! SQLite-backed [`RecordStore`](dripcast_core::RecordStore). Survives restarts and
//! enforces one delivery record per (recipient, message) pair.

pub mod sqlite;

pub use sqlite::SqliteStore;
