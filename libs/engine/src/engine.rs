//! Workflow execution engine
//!
//! Stateless over its parameters: one `execute` call drives one workflow's
//! step list to a terminal state. The engine owns every state transition,
//! emits progress events, and records history; steps only see the context.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::Instrument;

use metalforge_db::{HistoryStart, HistoryStore};
use metalforge_domain::{
    ErrorClass, ErrorKind, ProgressEvent, ProgressKind, StepError, StepOutcome, WorkflowError,
    WorkflowStatus,
};

use crate::bus::ProgressBus;
use crate::context::Context;
use crate::state::WorkflowState;
use crate::step::StepSpec;

// =============================================================================
// Configuration
// =============================================================================

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Slack multiplier on top of the summed step timeouts (0.10 = 10%)
    pub aggregate_slack: f64,

    /// How long a cancelled in-flight step may take to unwind before its
    /// future is dropped
    pub cancel_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregate_slack: 0.10,
            cancel_grace: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Shared handle to a workflow's runtime state
pub type SharedWorkflow = Arc<RwLock<WorkflowState>>;

/// Outcome of driving one step to rest
enum StepRun {
    Completed,
    Skipped(String),
    Failed(StepError),
    Cancelled(StepError),
}

/// Terminal outcome of a workflow
enum Terminal {
    Completed,
    Failed(WorkflowError),
    Cancelled(WorkflowError),
}

/// Workflow execution engine
///
/// Carries no per-workflow state; the manager creates one per spawned
/// workflow task.
pub struct Engine {
    bus: Arc<ProgressBus>,
    history: Arc<dyn HistoryStore>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with default configuration
    #[must_use]
    pub fn new(bus: Arc<ProgressBus>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            bus,
            history,
            config: EngineConfig::default(),
        }
    }

    /// Override the configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Drive a workflow to a terminal state
    ///
    /// Exactly one `workflow_end` event is published and exactly one
    /// effective finalize reaches the history store per call.
    pub async fn execute(self, shared: SharedWorkflow, specs: Vec<StepSpec>, ctx: Context) {
        let span = tracing::info_span!(
            "workflow",
            workflow_id = %ctx.workflow_id,
            correlation_id = %ctx.correlation_id,
        );
        self.execute_inner(shared, specs, ctx).instrument(span).await;
    }

    async fn execute_inner(self, shared: SharedWorkflow, specs: Vec<StepSpec>, mut ctx: Context) {
        let workflow_id = ctx.workflow_id.clone();

        let start = {
            let mut wf = shared.write().expect("workflow state lock poisoned");
            wf.start();
            HistoryStart {
                workflow_id: wf.workflow_id.clone(),
                server_id: wf.server_id.clone(),
                device_type: wf.device_type.clone(),
                total_steps: wf.steps.len() as i64,
                started_at: wf.started_at.unwrap_or_else(Utc::now),
                metadata: wf.metadata(),
            }
        };

        self.emit(ProgressEvent::workflow(&workflow_id, ProgressKind::WorkflowStart))
            .await;
        if let Err(err) = self.history.record_start(start).await {
            tracing::warn!(error = %err, "history start write failed; continuing");
        }

        let aggregate = aggregate_budget(&specs, self.config.aggregate_slack);
        let deadline = Instant::now() + aggregate;

        let mut terminal = Terminal::Completed;

        for (index, spec) in specs.iter().enumerate() {
            if ctx.is_cancelled() {
                shared
                    .write()
                    .expect("workflow state lock poisoned")
                    .skip_remaining();
                terminal = Terminal::Cancelled(WorkflowError {
                    kind: ErrorKind::Cancelled,
                    detail: "cancellation requested".to_string(),
                });
                break;
            }

            if Instant::now() >= deadline {
                shared
                    .write()
                    .expect("workflow state lock poisoned")
                    .skip_remaining();
                terminal = Terminal::Cancelled(WorkflowError {
                    kind: ErrorKind::Timeout,
                    detail: "aggregate workflow timeout exceeded".to_string(),
                });
                break;
            }

            ctx.begin_step(index, &spec.name);
            self.emit(ProgressEvent::step(
                &workflow_id,
                ProgressKind::StepStart,
                index,
                &spec.name,
            ))
            .await;

            match self.run_step(&shared, index, spec, &mut ctx, deadline).await {
                StepRun::Completed => {
                    let (completed, metadata) = {
                        let mut wf = shared.write().expect("workflow state lock poisoned");
                        wf.step_completed(index);
                        // Classification may have resolved the device type.
                        wf.device_type.clone_from(&ctx.device_type);
                        (wf.steps_completed, wf.metadata())
                    };
                    self.emit(ProgressEvent::step(
                        &workflow_id,
                        ProgressKind::StepEnd,
                        index,
                        &spec.name,
                    ))
                    .await;
                    if let Err(err) = self
                        .history
                        .update_progress(&workflow_id, completed as i64, metadata)
                        .await
                    {
                        tracing::warn!(error = %err, "history progress write failed; continuing");
                    }
                }
                StepRun::Skipped(reason) => {
                    shared
                        .write()
                        .expect("workflow state lock poisoned")
                        .step_skipped(index);
                    self.emit(
                        ProgressEvent::step(
                            &workflow_id,
                            ProgressKind::StepEnd,
                            index,
                            &spec.name,
                        )
                        .with_payload(format!("skipped: {reason}")),
                    )
                    .await;
                }
                StepRun::Failed(err) => {
                    let error = WorkflowError::from(err);
                    {
                        let mut wf = shared.write().expect("workflow state lock poisoned");
                        wf.step_failed(index, error.clone());
                        wf.skip_remaining();
                    }
                    self.emit(
                        ProgressEvent::step(
                            &workflow_id,
                            ProgressKind::StepEnd,
                            index,
                            &spec.name,
                        )
                        .with_error(&error),
                    )
                    .await;
                    terminal = Terminal::Failed(error);
                    break;
                }
                StepRun::Cancelled(err) => {
                    let step_error = WorkflowError::from(err);
                    {
                        let mut wf = shared.write().expect("workflow state lock poisoned");
                        wf.step_failed(index, step_error.clone());
                        wf.skip_remaining();
                    }
                    self.emit(
                        ProgressEvent::step(
                            &workflow_id,
                            ProgressKind::StepEnd,
                            index,
                            &spec.name,
                        )
                        .with_error(&step_error),
                    )
                    .await;

                    // Aggregate-timeout cancellations keep their timeout kind
                    // so operators can tell them from operator cancellations.
                    let workflow_error = if step_error.kind == ErrorKind::Timeout {
                        step_error
                    } else {
                        WorkflowError {
                            kind: ErrorKind::Cancelled,
                            detail: "workflow cancelled".to_string(),
                        }
                    };
                    terminal = Terminal::Cancelled(workflow_error);
                    break;
                }
            }
        }

        self.finish(&shared, &workflow_id, terminal).await;
    }

    /// Drive one step through its attempts, timeout and backoff
    async fn run_step(
        &self,
        shared: &SharedWorkflow,
        index: usize,
        spec: &StepSpec,
        ctx: &mut Context,
        aggregate_deadline: Instant,
    ) -> StepRun {
        let cancel = ctx.cancel_observer();
        let mut attempt = 0u32;
        let mut timeout_retries = 0u32;

        loop {
            attempt += 1;
            shared
                .write()
                .expect("workflow state lock poisoned")
                .step_started(index);

            let remaining = aggregate_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return StepRun::Cancelled(StepError::timeout(
                    "aggregate workflow timeout exceeded",
                ));
            }
            let per_attempt = spec.timeout.min(remaining);

            let outcome = {
                let fut = spec.action.run(ctx);
                tokio::pin!(fut);

                tokio::select! {
                    res = tokio::time::timeout(per_attempt, &mut fut) => match res {
                        Ok(inner) => inner,
                        Err(_) => Err(StepError::timeout(format!(
                            "step '{}' exceeded its {}s deadline",
                            spec.name,
                            per_attempt.as_secs(),
                        ))),
                    },
                    () = cancel.cancelled() => {
                        // Give the in-flight attempt a grace window to unwind
                        // cleanly, then abandon it by dropping its future.
                        match tokio::time::timeout(self.config.cancel_grace, &mut fut).await {
                            Ok(inner) => inner,
                            Err(_) => {
                                return StepRun::Cancelled(StepError::cancelled(format!(
                                    "step '{}' abandoned after the cancellation grace window",
                                    spec.name,
                                )))
                            }
                        }
                    }
                }
            };

            match outcome {
                Ok(StepOutcome::Done) => return StepRun::Completed,
                Ok(StepOutcome::Skipped(reason)) => return StepRun::Skipped(reason),
                Err(err) => match err.kind.class() {
                    ErrorClass::Cancel => return StepRun::Cancelled(err),
                    ErrorClass::Fatal => return StepRun::Failed(err),
                    ErrorClass::Retryable => {
                        if err.kind == ErrorKind::Timeout {
                            // Timeouts retry at most once within the step's
                            // retry budget and are fatal on the final attempt.
                            if timeout_retries >= 1 || attempt > spec.retries {
                                return StepRun::Failed(err);
                            }
                            timeout_retries += 1;
                        } else if attempt > spec.retries {
                            return StepRun::Failed(err);
                        }

                        if cancel.is_cancelled() {
                            return StepRun::Cancelled(StepError::cancelled(
                                "cancellation requested during retry",
                            ));
                        }

                        let delay = spec.retry_policy.delay_for(attempt);
                        tracing::warn!(
                            step = %spec.name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "step attempt failed; backing off",
                        );

                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            () = cancel.cancelled() => {
                                return StepRun::Cancelled(StepError::cancelled(
                                    "cancelled during retry backoff",
                                ))
                            }
                        }
                    }
                },
            }
        }
    }

    /// Single terminal path: state, events and history finalize
    async fn finish(&self, shared: &SharedWorkflow, workflow_id: &str, terminal: Terminal) {
        let (status, error) = match terminal {
            Terminal::Completed => (WorkflowStatus::Completed, None),
            Terminal::Failed(err) => (WorkflowStatus::Failed, Some(err)),
            Terminal::Cancelled(err) => (WorkflowStatus::Cancelled, Some(err)),
        };

        let metadata = {
            let mut wf = shared.write().expect("workflow state lock poisoned");
            wf.finish(status, error.clone());
            wf.metadata()
        };

        if status == WorkflowStatus::Cancelled {
            self.emit(ProgressEvent::workflow(workflow_id, ProgressKind::Cancellation))
                .await;
        }

        let payload = serde_json::json!({ "status": status, "error": error }).to_string();
        self.emit(
            ProgressEvent::workflow(workflow_id, ProgressKind::WorkflowEnd).with_payload(payload),
        )
        .await;

        match self
            .history
            .finalize(workflow_id, status, Utc::now(), error, metadata)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(workflow_id, "history row was already finalized");
            }
            Err(err) => {
                tracing::warn!(workflow_id, error = %err, "history finalize failed");
            }
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        self.bus.publish(event).await;
    }
}

/// Total wall-clock budget for a workflow
fn aggregate_budget(specs: &[StepSpec], slack: f64) -> Duration {
    let total: Duration = specs.iter().map(|s| s.timeout).sum();
    total.mul_f64(1.0 + slack.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::DEFAULT_STEP_TIMEOUT;
    use std::sync::Arc as StdArc;

    struct Noop;

    #[async_trait::async_trait]
    impl crate::step::Step for Noop {
        async fn run(&self, _ctx: &mut Context) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Done)
        }
    }

    #[test]
    fn test_aggregate_budget_includes_slack() {
        let specs = vec![
            StepSpec::new("a", "", StdArc::new(Noop)),
            StepSpec::new("b", "", StdArc::new(Noop)),
        ];
        let budget = aggregate_budget(&specs, 0.10);
        assert_eq!(budget, (DEFAULT_STEP_TIMEOUT * 2).mul_f64(1.10));
    }

    #[test]
    fn test_negative_slack_is_clamped() {
        let specs = vec![StepSpec::new("a", "", StdArc::new(Noop))];
        let budget = aggregate_budget(&specs, -1.0);
        assert_eq!(budget, DEFAULT_STEP_TIMEOUT);
    }
}
