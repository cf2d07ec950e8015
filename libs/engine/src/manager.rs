//! Workflow manager
//!
//! Owns the set of workflows: creates them through the factory, runs each on
//! its own task, routes cancellation, serves status snapshots and progress
//! subscriptions, and cleans up after terminal workflows. This is the whole
//! control surface the outer gateway consumes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use metalforge_adapters::CapabilityRegistry;
use metalforge_catalog::CatalogHandle;
use metalforge_db::HistoryStore;
use metalforge_domain::{
    ErrorKind, ProgressEvent, ProgressKind, ReclassifyPolicy, WorkflowError, WorkflowSnapshot,
    WorkflowStatus,
};

use crate::bus::{ProgressBus, ProgressSubscriber};
use crate::cancel::{cancel_pair, CancelSignal};
use crate::context::{Context, SubTaskSlot};
use crate::engine::{Engine, EngineConfig, SharedWorkflow};
use crate::factory::{FactoryError, WorkflowFactory};
use crate::state::WorkflowState;

// =============================================================================
// Requests and Errors
// =============================================================================

/// Parameters for creating a workflow
#[derive(Debug, Clone)]
pub struct CreateWorkflowRequest {
    pub template: String,
    pub server_id: String,
    pub device_type: Option<String>,
    pub target_ipmi_ip: Option<String>,
    pub gateway: Option<String>,
    pub firmware_first: bool,
    pub reclassify_policy: ReclassifyPolicy,
    pub extra_params: HashMap<String, serde_json::Value>,
}

impl CreateWorkflowRequest {
    /// Minimal request for a template and server
    #[must_use]
    pub fn new(template: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            server_id: server_id.into(),
            device_type: None,
            target_ipmi_ip: None,
            gateway: None,
            firmware_first: false,
            reclassify_policy: ReclassifyPolicy::default(),
            extra_params: HashMap::new(),
        }
    }

    /// Set the operator-supplied device type
    #[must_use]
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    /// Set BMC network targets
    #[must_use]
    pub fn with_ipmi_target(
        mut self,
        target_ipmi_ip: impl Into<String>,
        gateway: Option<String>,
    ) -> Self {
        self.target_ipmi_ip = Some(target_ipmi_ip.into());
        self.gateway = gateway;
        self
    }

    /// Select the firmware-first path
    #[must_use]
    pub fn with_firmware_first(mut self, firmware_first: bool) -> Self {
        self.firmware_first = firmware_first;
        self
    }

    /// Set the reclassification policy
    #[must_use]
    pub fn with_reclassify_policy(mut self, policy: ReclassifyPolicy) -> Self {
        self.reclassify_policy = policy;
        self
    }
}

/// Errors raised by workflow creation
#[derive(Debug, Error)]
pub enum CreateWorkflowError {
    #[error(transparent)]
    Template(#[from] FactoryError),

    #[error("server id must not be empty")]
    EmptyServerId,
}

// =============================================================================
// Configuration
// =============================================================================

/// Manager tuning knobs
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Grace period granted to workflows during shutdown
    pub shutdown_grace: Duration,

    /// How long terminal workflows stay in the in-memory map
    pub retention: Duration,

    /// Interval of the periodic cleanup pass
    pub cleanup_interval: Duration,

    /// Engine configuration applied to every workflow
    pub engine: EngineConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(30),
            retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            engine: EngineConfig::default(),
        }
    }
}

// =============================================================================
// Workflow Handle
// =============================================================================

struct WorkflowHandle {
    shared: SharedWorkflow,
    cancel: CancelSignal,
    join: Mutex<Option<JoinHandle<()>>>,
    sub_task: SubTaskSlot,
}

impl WorkflowHandle {
    fn snapshot(&self) -> WorkflowSnapshot {
        let sub_task = self
            .sub_task
            .lock()
            .expect("sub-task slot poisoned")
            .clone();
        self.shared
            .read()
            .expect("workflow state lock poisoned")
            .snapshot(sub_task)
    }

    fn is_terminal(&self) -> bool {
        self.shared
            .read()
            .expect("workflow state lock poisoned")
            .status
            .is_terminal()
    }
}

// =============================================================================
// Workflow Manager
// =============================================================================

/// Factory and registry for all workflows in this orchestrator
pub struct WorkflowManager {
    workflows: RwLock<HashMap<String, Arc<WorkflowHandle>>>,
    bus: Arc<ProgressBus>,
    history: Arc<dyn HistoryStore>,
    catalog: CatalogHandle,
    adapters: Arc<CapabilityRegistry>,
    factory: WorkflowFactory,
    config: ManagerConfig,
    credentials_ref: String,
}

impl WorkflowManager {
    /// Create a manager over the given collaborators
    #[must_use]
    pub fn new(
        catalog: CatalogHandle,
        adapters: Arc<CapabilityRegistry>,
        history: Arc<dyn HistoryStore>,
        factory: WorkflowFactory,
        config: ManagerConfig,
        credentials_ref: impl Into<String>,
    ) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            bus: Arc::new(ProgressBus::new()),
            history,
            catalog,
            adapters,
            factory,
            config,
            credentials_ref: credentials_ref.into(),
        }
    }

    /// Create a workflow and start it on its own task
    ///
    /// Returns the assigned workflow id of the form
    /// `<template>_<server_id>_<unix_ms>`.
    pub async fn create_workflow(
        &self,
        request: CreateWorkflowRequest,
    ) -> Result<String, CreateWorkflowError> {
        if request.server_id.trim().is_empty() {
            return Err(CreateWorkflowError::EmptyServerId);
        }

        let specs = self
            .factory
            .build(&request.template, request.firmware_first)?;

        let workflow_id = format!(
            "{}_{}_{}",
            request.template,
            request.server_id,
            Utc::now().timestamp_millis(),
        );

        let state = WorkflowState::new(
            &workflow_id,
            &request.template,
            &request.server_id,
            request.device_type.clone(),
            &specs,
        );
        let shared: SharedWorkflow = Arc::new(std::sync::RwLock::new(state));

        let (signal, observer) = cancel_pair();
        let ctx = Context::new(
            &workflow_id,
            &request.server_id,
            &self.credentials_ref,
            self.catalog.snapshot(),
            Arc::clone(&self.adapters),
            observer,
            Arc::clone(&self.bus),
        )
        .with_device_type(request.device_type)
        .with_ipmi_target(request.target_ipmi_ip, request.gateway)
        .with_reclassify_policy(request.reclassify_policy)
        .with_extras(request.extra_params);

        let sub_task = ctx.sub_task_slot();

        let engine = Engine::new(Arc::clone(&self.bus), Arc::clone(&self.history))
            .with_config(self.config.engine.clone());
        let join = tokio::spawn(engine.execute(Arc::clone(&shared), specs, ctx));

        let handle = Arc::new(WorkflowHandle {
            shared,
            cancel: signal,
            join: Mutex::new(Some(join)),
            sub_task,
        });

        self.workflows
            .write()
            .await
            .insert(workflow_id.clone(), handle);

        tracing::info!(workflow_id, template = %request.template, "workflow created");
        Ok(workflow_id)
    }

    /// Status snapshot of one workflow
    pub async fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowSnapshot> {
        let workflows = self.workflows.read().await;
        workflows.get(workflow_id).map(|h| h.snapshot())
    }

    /// Status snapshots of in-memory workflows, newest first
    pub async fn list_workflows(&self, status: Option<WorkflowStatus>) -> Vec<WorkflowSnapshot> {
        let workflows = self.workflows.read().await;
        let mut snapshots: Vec<WorkflowSnapshot> = workflows
            .values()
            .map(|h| h.snapshot())
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .collect();
        snapshots.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        snapshots
    }

    /// Request cancellation of a workflow
    ///
    /// Idempotent; returns `false` only when the workflow is unknown or
    /// already terminal.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> bool {
        let workflows = self.workflows.read().await;
        let Some(handle) = workflows.get(workflow_id) else {
            return false;
        };

        if handle.is_terminal() {
            return false;
        }

        handle.cancel.cancel();
        tracing::info!(workflow_id, "cancellation requested");
        true
    }

    /// Subscribe to one workflow's progress events
    pub async fn subscribe(&self, workflow_id: &str) -> ProgressSubscriber {
        self.bus.subscribe(workflow_id).await
    }

    /// Subscribe to every workflow's progress events
    #[must_use]
    pub fn subscribe_all(&self) -> ProgressSubscriber {
        self.bus.subscribe_all()
    }

    /// The progress bus, for wiring into outer gateways
    #[must_use]
    pub fn bus(&self) -> Arc<ProgressBus> {
        Arc::clone(&self.bus)
    }

    /// Wait for one workflow's task to finish
    pub async fn wait(&self, workflow_id: &str) {
        let handle = {
            let workflows = self.workflows.read().await;
            workflows.get(workflow_id).cloned()
        };

        if let Some(handle) = handle {
            let join = handle.join.lock().expect("join slot poisoned").take();
            if let Some(join) = join {
                let _ = join.await;
            }
        }
    }

    /// Graceful shutdown: cancel everything, wait out the grace period,
    /// force-finalize stragglers
    pub async fn shutdown(&self) {
        let handles: Vec<(String, Arc<WorkflowHandle>)> = {
            let workflows = self.workflows.read().await;
            workflows
                .iter()
                .map(|(id, h)| (id.clone(), Arc::clone(h)))
                .collect()
        };

        for (workflow_id, handle) in &handles {
            if !handle.is_terminal() {
                tracing::info!(workflow_id, "cancelling for shutdown");
                handle.cancel.cancel();
            }
        }

        let deadline = Instant::now() + self.config.shutdown_grace;

        for (workflow_id, handle) in handles {
            let join = handle.join.lock().expect("join slot poisoned").take();
            let Some(mut join) = join else { continue };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut join).await.is_err() {
                tracing::warn!(workflow_id, "workflow did not unwind in time; aborting");
                join.abort();
                let _ = join.await;
                self.force_finalize(&workflow_id, &handle).await;
            }
        }
    }

    /// Finalize a workflow whose task had to be aborted
    async fn force_finalize(&self, workflow_id: &str, handle: &WorkflowHandle) {
        let error = WorkflowError {
            kind: ErrorKind::ShutdownTimeout,
            detail: "workflow did not unwind within the shutdown grace period".to_string(),
        };

        let metadata = {
            let mut wf = handle.shared.write().expect("workflow state lock poisoned");
            if wf.status.is_terminal() {
                // The engine won the race and finalized normally.
                return;
            }
            wf.skip_remaining();
            wf.finish(WorkflowStatus::Failed, Some(error.clone()));
            wf.metadata()
        };

        let payload = serde_json::json!({
            "status": WorkflowStatus::Failed,
            "error": error,
        })
        .to_string();
        self.bus
            .publish(
                ProgressEvent::workflow(workflow_id, ProgressKind::WorkflowEnd)
                    .with_payload(payload),
            )
            .await;

        match self
            .history
            .finalize(
                workflow_id,
                WorkflowStatus::Failed,
                Utc::now(),
                Some(error),
                metadata,
            )
            .await
        {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(workflow_id, error = %err, "force finalize failed");
            }
        }
    }

    /// One cleanup pass: drop terminal workflows past retention
    pub async fn cleanup_once(&self) {
        let now = Utc::now();
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        let expired: Vec<String> = {
            let workflows = self.workflows.read().await;
            workflows
                .iter()
                .filter(|(_, handle)| {
                    let wf = handle.shared.read().expect("workflow state lock poisoned");
                    wf.status.is_terminal()
                        && wf.ended_at.is_some_and(|ended| now - ended > retention)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        if expired.is_empty() {
            return;
        }

        {
            let mut workflows = self.workflows.write().await;
            for workflow_id in &expired {
                workflows.remove(workflow_id);
            }
        }

        for workflow_id in &expired {
            self.bus.cleanup(workflow_id).await;
            tracing::info!(workflow_id, "terminal workflow dropped from memory");
        }
    }

    /// Spawn the periodic cleanup task
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.cleanup_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                manager.cleanup_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::BASIC_PROVISIONING;
    use metalforge_adapters::stub::StubAdapters;
    use metalforge_catalog::Catalog;
    use metalforge_db::InMemoryHistoryStore;

    const CATALOG: &str = r#"
vendors:
  supermicro:
    display_name: Supermicro
    motherboards:
      X11DPT-B:
        device_types:
          a1.c5.large:
            description: compute node
"#;

    fn manager() -> (Arc<WorkflowManager>, StubAdapters) {
        let stubs = StubAdapters::new();
        let manager = WorkflowManager::new(
            CatalogHandle::new(Catalog::load(CATALOG).unwrap()),
            stubs.registry(),
            Arc::new(InMemoryHistoryStore::new()),
            WorkflowFactory::new(),
            ManagerConfig::default(),
            "default",
        );
        (Arc::new(manager), stubs)
    }

    #[tokio::test]
    async fn test_create_unknown_template() {
        let (manager, _stubs) = manager();
        let result = manager
            .create_workflow(CreateWorkflowRequest::new("mystery", "srv-001"))
            .await;
        assert!(matches!(
            result,
            Err(CreateWorkflowError::Template(FactoryError::UnknownTemplate(_)))
        ));
    }

    #[tokio::test]
    async fn test_create_empty_server_id() {
        let (manager, _stubs) = manager();
        let result = manager
            .create_workflow(CreateWorkflowRequest::new(BASIC_PROVISIONING, "  "))
            .await;
        assert!(matches!(result, Err(CreateWorkflowError::EmptyServerId)));
    }

    #[tokio::test]
    async fn test_workflow_id_shape() {
        let (manager, _stubs) = manager();
        let id = manager
            .create_workflow(
                CreateWorkflowRequest::new(BASIC_PROVISIONING, "srv-001")
                    .with_ipmi_target("10.30.0.5", None),
            )
            .await
            .unwrap();

        assert!(id.starts_with("basic_provisioning_srv-001_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert!(suffix.parse::<i64>().is_ok());

        manager.wait(&id).await;
    }

    #[tokio::test]
    async fn test_cancel_after_terminal_is_rejected() {
        let (manager, _stubs) = manager();
        let id = manager
            .create_workflow(
                CreateWorkflowRequest::new(BASIC_PROVISIONING, "srv-001")
                    .with_ipmi_target("10.30.0.5", None),
            )
            .await
            .unwrap();

        manager.wait(&id).await;
        assert!(!manager.cancel_workflow(&id).await);
    }

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let (manager, _stubs) = manager();
        let id = manager
            .create_workflow(
                CreateWorkflowRequest::new(BASIC_PROVISIONING, "srv-001")
                    .with_ipmi_target("10.30.0.5", None),
            )
            .await
            .unwrap();
        manager.wait(&id).await;

        // Within retention: stays resident.
        manager.cleanup_once().await;
        assert!(manager.get_workflow(&id).await.is_some());

        let completed = manager
            .list_workflows(Some(WorkflowStatus::Completed))
            .await;
        assert_eq!(completed.len(), 1);
        assert!(manager
            .list_workflows(Some(WorkflowStatus::Running))
            .await
            .is_empty());
    }
}
