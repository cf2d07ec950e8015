//! Lifecycle and classification enums
//!
//! These enums are the source of truth for workflow and step lifecycles and
//! must match the values persisted in the history store exactly.

use serde::{Deserialize, Serialize};

// =============================================================================
// Workflow Lifecycle
// =============================================================================

/// Status of a workflow
///
/// `Completed`, `Failed` and `Cancelled` are terminal: once entered, no
/// further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Check if transition to target status is allowed
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        use WorkflowStatus::{Cancelled, Completed, Failed, Pending, Running};

        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Check if this is a terminal status
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Get the status name as persisted in the history store
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Step Lifecycle
// =============================================================================

/// Status of a workflow step
///
/// Retrying is represented as an attempt counter on the step, not as a
/// distinct status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Check if transition to target status is allowed
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        use StepStatus::{Completed, Failed, Pending, Running, Skipped};

        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Skipped)
        )
    }

    /// Check if this is a terminal status
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Get the status name as a string
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Classification Confidence
// =============================================================================

/// Confidence bucket for a device-type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Map a weighted score into a confidence bucket
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Self::High
        } else if score >= 0.50 {
            Self::Medium
        } else if score >= 0.30 {
            Self::Low
        } else {
            Self::None
        }
    }

    /// Whether this confidence is strong enough for an intelligent plan
    #[must_use]
    pub fn supports_intelligent_plan(self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }
}

// =============================================================================
// Reclassification Policy
// =============================================================================

/// Whether classification may overwrite a caller-supplied device type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclassifyPolicy {
    /// Keep a caller-supplied device type; classify only when blank
    #[default]
    KeepExisting,
    /// Always classify, replacing any caller-supplied value
    AlwaysReclassify,
}

// =============================================================================
// Progress Event Kind
// =============================================================================

/// Kind of a progress bus event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    WorkflowStart,
    StepStart,
    SubTask,
    StepEnd,
    WorkflowEnd,
    Cancellation,
}

impl ProgressKind {
    /// Get the kind name as a string
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowStart => "workflow_start",
            Self::StepStart => "step_start",
            Self::SubTask => "sub_task",
            Self::StepEnd => "step_end",
            Self::WorkflowEnd => "workflow_end",
            Self::Cancellation => "cancellation",
        }
    }
}
