//! History store trait and SQLite implementation
//!
//! Writes for one workflow id are serialized by construction: the engine is
//! the only writer while a workflow runs, and `finalize` applies only to
//! rows that are not already terminal, so a late force-finalize cannot
//! overwrite the engine's terminal record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use metalforge_domain::{ErrorKind, HistoryFilter, HistoryRecord, WorkflowError, WorkflowStatus};

use crate::errors::{FindHistoryError, HistoryWriteError, ListHistoryError};

// =============================================================================
// Input Types
// =============================================================================

/// Input for creating a workflow history row
#[derive(Debug, Clone)]
pub struct HistoryStart {
    pub workflow_id: String,
    pub server_id: String,
    pub device_type: Option<String>,
    pub total_steps: i64,
    pub started_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

// =============================================================================
// History Store Trait
// =============================================================================

/// Durable record of workflow executions
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the row for a workflow that has just started
    async fn record_start(&self, start: HistoryStart) -> Result<(), HistoryWriteError>;

    /// Update progress after a completed step
    async fn update_progress(
        &self,
        workflow_id: &str,
        steps_completed: i64,
        metadata: serde_json::Value,
    ) -> Result<(), HistoryWriteError>;

    /// Finalize the row with a terminal status
    ///
    /// Returns `true` when the row was still non-terminal and the update
    /// applied; `false` when a terminal status was already recorded. This is
    /// what makes late force-finalization idempotent.
    async fn finalize(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        completed_at: DateTime<Utc>,
        error: Option<WorkflowError>,
        metadata: serde_json::Value,
    ) -> Result<bool, HistoryWriteError>;

    /// Fetch one row
    async fn get(&self, workflow_id: &str) -> Result<HistoryRecord, FindHistoryError>;

    /// List rows, newest first
    async fn list(&self, filter: HistoryFilter) -> Result<Vec<HistoryRecord>, ListHistoryError>;

    /// Startup scan: finalize rows left RUNNING by a previous process
    ///
    /// Returns the number of rows recovered.
    async fn recover_interrupted(&self) -> Result<u64, HistoryWriteError>;
}

// =============================================================================
// SQLite History Store
// =============================================================================

/// SQLite-backed history store
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Wrap a pool; call [`Self::init_schema`] before first use
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the history table if it does not exist
    pub async fn init_schema(&self) -> Result<(), HistoryWriteError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_history (
                workflow_id     TEXT PRIMARY KEY,
                server_id       TEXT NOT NULL,
                device_type     TEXT,
                status          TEXT NOT NULL,
                started_at      TEXT NOT NULL,
                completed_at    TEXT,
                steps_completed INTEGER NOT NULL DEFAULT 0,
                total_steps     INTEGER NOT NULL,
                error_kind      TEXT,
                error_detail    TEXT,
                metadata        TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(HistoryWriteError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_workflow_history_status ON workflow_history (status)",
        )
        .execute(&self.pool)
        .await
        .map_err(HistoryWriteError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn record_start(&self, start: HistoryStart) -> Result<(), HistoryWriteError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_history
                (workflow_id, server_id, device_type, status, started_at, steps_completed, total_steps, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)
            "#,
        )
        .bind(&start.workflow_id)
        .bind(&start.server_id)
        .bind(&start.device_type)
        .bind(WorkflowStatus::Running.as_str())
        .bind(start.started_at)
        .bind(start.total_steps)
        .bind(&start.metadata)
        .execute(&self.pool)
        .await
        .map_err(HistoryWriteError::Database)?;

        Ok(())
    }

    async fn update_progress(
        &self,
        workflow_id: &str,
        steps_completed: i64,
        metadata: serde_json::Value,
    ) -> Result<(), HistoryWriteError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_history
            SET steps_completed = ?2, metadata = ?3
            WHERE workflow_id = ?1
            "#,
        )
        .bind(workflow_id)
        .bind(steps_completed)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(HistoryWriteError::Database)?;

        if result.rows_affected() == 0 {
            return Err(HistoryWriteError::NotFound(workflow_id.to_string()));
        }

        Ok(())
    }

    async fn finalize(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        completed_at: DateTime<Utc>,
        error: Option<WorkflowError>,
        metadata: serde_json::Value,
    ) -> Result<bool, HistoryWriteError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_history
            SET status = ?2,
                completed_at = ?3,
                error_kind = ?4,
                error_detail = ?5,
                metadata = ?6
            WHERE workflow_id = ?1
              AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(workflow_id)
        .bind(status.as_str())
        .bind(completed_at)
        .bind(error.as_ref().map(|e| e.kind.as_str()))
        .bind(error.as_ref().map(|e| e.detail.as_str()))
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(HistoryWriteError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, workflow_id: &str) -> Result<HistoryRecord, FindHistoryError> {
        let row: Option<HistoryRow> =
            sqlx::query_as("SELECT * FROM workflow_history WHERE workflow_id = ?1")
                .bind(workflow_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(FindHistoryError::Database)?;

        row.ok_or_else(|| FindHistoryError::NotFound(workflow_id.to_string()))?
            .try_into()
    }

    async fn list(&self, filter: HistoryFilter) -> Result<Vec<HistoryRecord>, ListHistoryError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT * FROM workflow_history
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR server_id = ?2)
            ORDER BY started_at DESC
            "#,
        )
        .bind(filter.status.map(WorkflowStatus::as_str))
        .bind(filter.server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ListHistoryError::Database)?;

        // Corrupt rows are skipped with a log line rather than failing the
        // whole listing.
        Ok(rows
            .into_iter()
            .filter_map(|row| match HistoryRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping corrupt history row");
                    None
                }
            })
            .collect())
    }

    async fn recover_interrupted(&self) -> Result<u64, HistoryWriteError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_history
            SET status = 'failed',
                completed_at = ?1,
                error_kind = ?2,
                error_detail = 'workflow was in flight when the orchestrator stopped'
            WHERE status IN ('pending', 'running')
            "#,
        )
        .bind(Utc::now())
        .bind(ErrorKind::OrchestratorRestart.as_str())
        .execute(&self.pool)
        .await
        .map_err(HistoryWriteError::Database)?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Database Row Type
// =============================================================================

/// Row type for the workflow_history table
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    workflow_id: String,
    server_id: String,
    device_type: Option<String>,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    steps_completed: i64,
    total_steps: i64,
    error_kind: Option<String>,
    error_detail: Option<String>,
    metadata: serde_json::Value,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = FindHistoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let status: WorkflowStatus =
            row.status
                .parse()
                .map_err(|detail| FindHistoryError::Corrupt {
                    workflow_id: row.workflow_id.clone(),
                    detail,
                })?;

        let error = match row.error_kind {
            Some(kind) => {
                let kind: ErrorKind = kind.parse().map_err(|detail| FindHistoryError::Corrupt {
                    workflow_id: row.workflow_id.clone(),
                    detail,
                })?;
                Some(WorkflowError {
                    kind,
                    detail: row.error_detail.unwrap_or_default(),
                })
            }
            None => None,
        };

        Ok(HistoryRecord {
            workflow_id: row.workflow_id,
            server_id: row.server_id,
            device_type: row.device_type,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            steps_completed: row.steps_completed,
            total_steps: row.total_steps,
            error,
            metadata: row.metadata,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
