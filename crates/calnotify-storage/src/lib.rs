//! # calnotify storage
//! Event store backends and the calendar facade built on top of them.

pub mod calendar;
pub mod memory;
pub mod sqlite;

pub use calendar::Calendar;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use calnotify_core::config::StorageConfig;
use calnotify_core::error::{CalNotifyError, Result};
use calnotify_core::traits::EventStore;

/// Create an event store from configuration.
pub fn create_store(config: &StorageConfig) -> Result<Box<dyn EventStore>> {
    match config.backend.as_str() {
        "memory" | "inmemory" => Ok(Box::new(MemoryStore::with_retention(config.retention))),
        "sqlite" | "sql" => Ok(Box::new(SqliteStore::new(config))),
        other => Err(CalNotifyError::Config(
            format!("Unknown storage backend: {other}")
        )),
    }
}
