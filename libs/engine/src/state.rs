//! Runtime state of a workflow and its steps
//!
//! The engine is the only writer while a workflow runs; the manager reads
//! through short-lived lock guards to build status snapshots. Transitions
//! are guarded by the domain state machines; an invalid transition is an
//! engine bug and is logged, never silently applied.

use chrono::{DateTime, Utc};

use metalforge_domain::{
    StepSnapshot, StepStatus, WorkflowError, WorkflowSnapshot, WorkflowStatus,
};

use crate::step::StepSpec;

// =============================================================================
// Step Runtime
// =============================================================================

/// Mutable runtime record of one step
#[derive(Debug, Clone)]
pub struct StepRuntime {
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<WorkflowError>,
}

impl StepRuntime {
    fn new(spec: &StepSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            status: StepStatus::Pending,
            attempts: 0,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    fn transition(&mut self, target: StepStatus) {
        if self.status.can_transition_to(target) {
            self.status = target;
        } else {
            tracing::error!(
                step = %self.name,
                from = %self.status,
                to = %target,
                "invalid step transition requested"
            );
        }
    }

    fn snapshot(&self) -> StepSnapshot {
        let duration_ms = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => {
                u64::try_from((end - start).num_milliseconds().max(0)).ok()
            }
            _ => None,
        };

        StepSnapshot {
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status,
            attempts: self.attempts,
            duration_ms,
            error: self.error.clone(),
        }
    }
}

// =============================================================================
// Workflow State
// =============================================================================

/// Mutable runtime record of one workflow
#[derive(Debug)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub template: String,
    pub server_id: String,
    pub device_type: Option<String>,
    pub status: WorkflowStatus,
    pub steps: Vec<StepRuntime>,
    pub steps_completed: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<WorkflowError>,
}

impl WorkflowState {
    /// Create a pending workflow over the given step specs
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        template: impl Into<String>,
        server_id: impl Into<String>,
        device_type: Option<String>,
        specs: &[StepSpec],
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            template: template.into(),
            server_id: server_id.into(),
            device_type,
            status: WorkflowStatus::Pending,
            steps: specs.iter().map(StepRuntime::new).collect(),
            steps_completed: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Move the workflow to Running
    pub fn start(&mut self) {
        self.transition(WorkflowStatus::Running);
        self.started_at = Some(Utc::now());
    }

    /// Move the workflow to a terminal status
    pub fn finish(&mut self, status: WorkflowStatus, error: Option<WorkflowError>) {
        self.transition(status);
        self.ended_at = Some(Utc::now());
        if self.error.is_none() {
            self.error = error;
        }
    }

    fn transition(&mut self, target: WorkflowStatus) {
        if self.status.can_transition_to(target) {
            self.status = target;
        } else {
            tracing::error!(
                workflow = %self.workflow_id,
                from = %self.status,
                to = %target,
                "invalid workflow transition requested"
            );
        }
    }

    /// Mark a step as started (or retried)
    pub fn step_started(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            if step.status == StepStatus::Pending {
                step.transition(StepStatus::Running);
                step.started_at = Some(Utc::now());
            }
            step.attempts += 1;
        }
    }

    /// Mark a step completed and bump the progress counter
    pub fn step_completed(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            step.transition(StepStatus::Completed);
            step.ended_at = Some(Utc::now());
        }
        // Monotonic and bounded by construction.
        self.steps_completed = (self.steps_completed + 1).min(self.steps.len());
    }

    /// Mark a step skipped
    pub fn step_skipped(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            step.transition(StepStatus::Skipped);
            step.ended_at = Some(Utc::now());
        }
    }

    /// Mark a step failed with its error
    pub fn step_failed(&mut self, index: usize, error: WorkflowError) {
        if let Some(step) = self.steps.get_mut(index) {
            step.transition(StepStatus::Failed);
            step.ended_at = Some(Utc::now());
            step.error = Some(error);
        }
    }

    /// Skip every step that is still pending
    pub fn skip_remaining(&mut self) {
        for step in &mut self.steps {
            if step.status == StepStatus::Pending {
                step.transition(StepStatus::Skipped);
                step.ended_at = Some(Utc::now());
            }
        }
    }

    /// Name of the step currently running
    #[must_use]
    pub fn current_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Running)
            .map(|s| s.name.as_str())
    }

    /// Build a wire snapshot
    #[must_use]
    pub fn snapshot(&self, current_sub_task: Option<String>) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.workflow_id.clone(),
            template: self.template.clone(),
            status: self.status,
            server_id: self.server_id.clone(),
            device_type: self.device_type.clone(),
            steps_total: self.steps.len(),
            steps_completed: self.steps_completed,
            current_step: self.current_step().map(String::from),
            current_sub_task,
            started_at: self.started_at,
            completed_at: self.ended_at,
            error: self.error.clone(),
            steps: self.steps.iter().map(StepRuntime::snapshot).collect(),
        }
    }

    /// Build the opaque metadata blob persisted alongside the history row
    #[must_use]
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "template": self.template,
            "device_type": self.device_type,
            "steps": self
                .steps
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "name": s.name,
                        "status": s.status,
                        "attempts": s.attempts,
                        "error": s.error,
                    })
                })
                .collect::<Vec<_>>(),
            "updated_at": Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepSpec;
    use metalforge_domain::{ErrorKind, StepOutcome};
    use std::sync::Arc;

    struct Noop;

    #[async_trait::async_trait]
    impl crate::step::Step for Noop {
        async fn run(
            &self,
            _ctx: &mut crate::context::Context,
        ) -> Result<StepOutcome, metalforge_domain::StepError> {
            Ok(StepOutcome::Done)
        }
    }

    fn specs(n: usize) -> Vec<StepSpec> {
        (0..n)
            .map(|i| StepSpec::new(format!("step_{i}"), "test step", Arc::new(Noop)))
            .collect()
    }

    #[test]
    fn test_progress_counter_is_bounded() {
        let specs = specs(2);
        let mut state = WorkflowState::new("wf", "basic_provisioning", "srv", None, &specs);
        state.start();

        for i in 0..2 {
            state.step_started(i);
            state.step_completed(i);
        }
        // A stray extra completion cannot push past the bound.
        state.step_completed(1);
        assert_eq!(state.steps_completed, 2);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let specs = specs(1);
        let mut state = WorkflowState::new("wf", "basic_provisioning", "srv", None, &specs);
        state.start();
        state.finish(WorkflowStatus::Failed, None);

        // A later finish call must not move the status.
        state.finish(WorkflowStatus::Completed, None);
        assert_eq!(state.status, WorkflowStatus::Failed);
    }

    #[test]
    fn test_first_error_wins() {
        let specs = specs(1);
        let mut state = WorkflowState::new("wf", "basic_provisioning", "srv", None, &specs);
        state.start();

        state.finish(
            WorkflowStatus::Failed,
            Some(WorkflowError {
                kind: ErrorKind::ConfigConflict,
                detail: "first".to_string(),
            }),
        );
        state.finish(
            WorkflowStatus::Failed,
            Some(WorkflowError {
                kind: ErrorKind::Internal,
                detail: "second".to_string(),
            }),
        );

        assert_eq!(state.error.as_ref().unwrap().detail, "first");
    }

    #[test]
    fn test_skip_remaining_only_touches_pending() {
        let specs = specs(3);
        let mut state = WorkflowState::new("wf", "basic_provisioning", "srv", None, &specs);
        state.start();

        state.step_started(0);
        state.step_completed(0);
        state.step_started(1);
        state.step_failed(
            1,
            WorkflowError {
                kind: ErrorKind::ConfigConflict,
                detail: "rejected".to_string(),
            },
        );
        state.skip_remaining();

        assert_eq!(state.steps[0].status, StepStatus::Completed);
        assert_eq!(state.steps[1].status, StepStatus::Failed);
        assert_eq!(state.steps[2].status, StepStatus::Skipped);
    }

    #[test]
    fn test_snapshot_reflects_current_step() {
        let specs = specs(2);
        let mut state = WorkflowState::new("wf", "basic_provisioning", "srv", None, &specs);
        state.start();
        state.step_started(0);

        let snapshot = state.snapshot(Some("probing".to_string()));
        assert_eq!(snapshot.current_step.as_deref(), Some("step_0"));
        assert_eq!(snapshot.current_sub_task.as_deref(), Some("probing"));
        assert_eq!(snapshot.steps.len(), 2);
        assert_eq!(snapshot.steps[0].attempts, 1);
    }
}
