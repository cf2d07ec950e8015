//! Progress events published on the progress bus
//!
//! Events are the low-latency signal; the history store is the durable
//! truth. Subscribers must tolerate dropped events (bounded ring buffers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::ProgressKind;
use crate::error::WorkflowError;

/// A single progress event for one workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Workflow this event belongs to
    pub workflow_id: String,

    /// Event kind
    pub kind: ProgressKind,

    /// Step index, for step-scoped kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,

    /// Step name, for step-scoped kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,

    /// When the event was published
    pub timestamp: DateTime<Utc>,

    /// Free-form payload; for terminal events carries status and error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl ProgressEvent {
    /// Create an event with no step scope
    #[must_use]
    pub fn workflow(workflow_id: impl Into<String>, kind: ProgressKind) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            kind,
            step_index: None,
            step_name: None,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    /// Create a step-scoped event
    #[must_use]
    pub fn step(
        workflow_id: impl Into<String>,
        kind: ProgressKind,
        step_index: usize,
        step_name: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            kind,
            step_index: Some(step_index),
            step_name: Some(step_name.into()),
            timestamp: Utc::now(),
            payload: None,
        }
    }

    /// Attach a free-form payload
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attach an error payload in the `kind: detail` form
    #[must_use]
    pub fn with_error(self, error: &WorkflowError) -> Self {
        let payload = format!("{}: {}", error.kind, error.detail);
        self.with_payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_event_serialization_omits_empty_fields() {
        let event = ProgressEvent::workflow("basic_provisioning_srv-001_1700000000000", ProgressKind::WorkflowStart);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("workflow_start"));
        assert!(!json.contains("step_index"));
        assert!(!json.contains("payload"));
    }

    #[test]
    fn test_step_event_carries_scope() {
        let event = ProgressEvent::step("wf", ProgressKind::StepStart, 2, "pull_bios_config");
        assert_eq!(event.step_index, Some(2));
        assert_eq!(event.step_name.as_deref(), Some("pull_bios_config"));
    }

    #[test]
    fn test_error_payload_format() {
        let error = WorkflowError {
            kind: ErrorKind::ConfigConflict,
            detail: "attribute rejected".to_string(),
        };
        let event = ProgressEvent::workflow("wf", ProgressKind::WorkflowEnd).with_error(&error);
        assert_eq!(
            event.payload.as_deref(),
            Some("config_conflict: attribute rejected")
        );
    }
}
