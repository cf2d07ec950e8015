//! Per-operation history store errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryWriteError {
    #[error("history row not found: {0}")]
    NotFound(String),
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("metadata serialization error")]
    Serialization(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FindHistoryError {
    #[error("history row not found: {0}")]
    NotFound(String),
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("corrupt history row {workflow_id}: {detail}")]
    Corrupt { workflow_id: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ListHistoryError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}
