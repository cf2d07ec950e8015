//! Durable workflow history store
//!
//! One row per workflow execution, keyed by workflow id, in a local SQLite
//! database. The store is the durable truth about workflow outcomes; the
//! progress bus is only the low-latency signal.

pub mod errors;
pub mod history;
pub mod memory;

pub use errors::{FindHistoryError, HistoryWriteError, ListHistoryError};
pub use history::{HistoryStart, HistoryStore, SqliteHistoryStore};
pub use memory::InMemoryHistoryStore;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open (creating if missing) the orchestrator database at `path`
pub async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
}

/// Open an in-memory database, used by tests
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
}
