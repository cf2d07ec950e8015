//! Wire-level workflow status snapshots
//!
//! These are the read-model served to operator tooling. They are cheap
//! copies of engine state; mutating a snapshot has no effect on the
//! workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{StepStatus, WorkflowStatus};
use crate::error::WorkflowError;

/// Snapshot of a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub name: String,
    pub description: String,
    pub status: StepStatus,

    /// Number of attempts made so far (0 until first start)
    pub attempts: u32,

    /// Wall-clock duration of the step, when it has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
}

/// Snapshot of a whole workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub template: String,
    pub status: WorkflowStatus,
    pub server_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    pub steps_total: usize,
    pub steps_completed: usize,

    /// Name of the step currently running, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Most recent sub-task note from the running step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_sub_task: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,

    pub steps: Vec<StepSnapshot>,
}

impl WorkflowSnapshot {
    /// Whether the workflow has reached a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = WorkflowSnapshot {
            workflow_id: "basic_provisioning_srv-001_1700000000000".to_string(),
            template: "basic_provisioning".to_string(),
            status: WorkflowStatus::Running,
            server_id: "srv-001".to_string(),
            device_type: Some("a1.c5.large".to_string()),
            steps_total: 7,
            steps_completed: 2,
            current_step: Some("pull_bios_config".to_string()),
            current_sub_task: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: None,
            steps: vec![],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(!json.contains("completed_at"));

        let parsed: WorkflowSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
