//! Durable history record for a workflow execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::WorkflowStatus;
use crate::error::WorkflowError;

/// One row in the workflow history store, keyed by workflow id
///
/// `metadata` is an opaque, append-mostly snapshot; consumers must tolerate
/// unknown fields and version drift within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub workflow_id: String,
    pub server_id: String,
    pub device_type: Option<String>,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps_completed: i64,
    pub total_steps: i64,
    pub error: Option<WorkflowError>,
    pub metadata: serde_json::Value,
}

/// Filter for history listings
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<WorkflowStatus>,
    pub server_id: Option<String>,
}

impl HistoryFilter {
    /// Filter by status
    #[must_use]
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by server id
    #[must_use]
    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}
