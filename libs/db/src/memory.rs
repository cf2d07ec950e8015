//! In-memory history store for tests and dry runs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use metalforge_domain::{HistoryFilter, HistoryRecord, WorkflowError, WorkflowStatus};

use crate::errors::{FindHistoryError, HistoryWriteError, ListHistoryError};
use crate::history::{HistoryStart, HistoryStore};

/// History store backed by a process-local map
///
/// Mirrors the SQLite implementation's semantics, including the
/// finalize-only-once guarantee. Not durable; for tests and dry runs only.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: Mutex<HashMap<String, HistoryRecord>>,
}

impl InMemoryHistoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of finalize calls that actually applied, per workflow
    ///
    /// Used by invariant tests: the count must never exceed one.
    pub async fn finalized_count(&self, workflow_id: &str) -> usize {
        let rows = self.rows.lock().await;
        usize::from(
            rows.get(workflow_id)
                .is_some_and(|r| r.status.is_terminal()),
        )
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record_start(&self, start: HistoryStart) -> Result<(), HistoryWriteError> {
        let mut rows = self.rows.lock().await;
        rows.insert(
            start.workflow_id.clone(),
            HistoryRecord {
                workflow_id: start.workflow_id,
                server_id: start.server_id,
                device_type: start.device_type,
                status: WorkflowStatus::Running,
                started_at: start.started_at,
                completed_at: None,
                steps_completed: 0,
                total_steps: start.total_steps,
                error: None,
                metadata: start.metadata,
            },
        );
        Ok(())
    }

    async fn update_progress(
        &self,
        workflow_id: &str,
        steps_completed: i64,
        metadata: serde_json::Value,
    ) -> Result<(), HistoryWriteError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(workflow_id)
            .ok_or_else(|| HistoryWriteError::NotFound(workflow_id.to_string()))?;
        row.steps_completed = steps_completed;
        row.metadata = metadata;
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
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(workflow_id)
            .ok_or_else(|| HistoryWriteError::NotFound(workflow_id.to_string()))?;

        if row.status.is_terminal() {
            return Ok(false);
        }

        row.status = status;
        row.completed_at = Some(completed_at);
        row.error = error;
        row.metadata = metadata;
        Ok(true)
    }

    async fn get(&self, workflow_id: &str) -> Result<HistoryRecord, FindHistoryError> {
        let rows = self.rows.lock().await;
        rows.get(workflow_id)
            .cloned()
            .ok_or_else(|| FindHistoryError::NotFound(workflow_id.to_string()))
    }

    async fn list(&self, filter: HistoryFilter) -> Result<Vec<HistoryRecord>, ListHistoryError> {
        let rows = self.rows.lock().await;
        let mut records: Vec<HistoryRecord> = rows
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| {
                filter
                    .server_id
                    .as_deref()
                    .is_none_or(|s| r.server_id == s)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }

    async fn recover_interrupted(&self) -> Result<u64, HistoryWriteError> {
        let mut rows = self.rows.lock().await;
        let mut recovered = 0;
        for row in rows.values_mut() {
            if !row.status.is_terminal() {
                row.status = WorkflowStatus::Failed;
                row.completed_at = Some(Utc::now());
                row.error = Some(WorkflowError {
                    kind: metalforge_domain::ErrorKind::OrchestratorRestart,
                    detail: "workflow was in flight when the orchestrator stopped".to_string(),
                });
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_matches_sqlite_semantics() {
        let store = InMemoryHistoryStore::new();
        store
            .record_start(HistoryStart {
                workflow_id: "wf-1".to_string(),
                server_id: "srv-001".to_string(),
                device_type: None,
                total_steps: 3,
                started_at: Utc::now(),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert!(store
            .finalize(
                "wf-1",
                WorkflowStatus::Completed,
                Utc::now(),
                None,
                serde_json::json!({}),
            )
            .await
            .unwrap());

        // Second finalize must be rejected.
        assert!(!store
            .finalize(
                "wf-1",
                WorkflowStatus::Failed,
                Utc::now(),
                None,
                serde_json::json!({}),
            )
            .await
            .unwrap());

        assert_eq!(store.finalized_count("wf-1").await, 1);
    }
}
