//! Data layer module
//!
//! Handles all presence persistence and caching:
//! - Record store seam and its adapters (memory, SQLite)
//! - TTL cache (volatile)
//! - Stored and logical presence models

mod cache;
mod database;
mod models;
mod store;

pub use cache::{CacheStats, TtlCache};
pub use database::SqliteRecordStore;
pub use models::*;
pub use store::{MemoryRecordStore, RecordStore};

#[cfg(test)]
pub use store::MockRecordStore;

#[cfg(test)]
mod database_test;
