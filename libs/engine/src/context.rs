//! Per-workflow execution context
//!
//! One context per workflow, threaded mutably through the step sequence.
//! Well-known fields are typed; everything steps hand to each other goes
//! through the extras map under the keys in [`keys`]. Steps validate the
//! keys they consume at entry and never retain references to the context
//! after returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use metalforge_adapters::CapabilityRegistry;
use metalforge_catalog::Catalog;
use metalforge_domain::{Confidence, ProgressEvent, ProgressKind, ReclassifyPolicy, StepError};

use crate::bus::ProgressBus;
use crate::cancel::CancelObserver;

/// Well-known context keys
pub mod keys {
    /// MaaS system id of the commissioned machine (String)
    pub const SERVER_HANDLE: &str = "server_handle";
    /// Discovered hardware facts (`HardwareFacts`)
    pub const HW_FACTS: &str = "hw_facts";
    /// Classification result (`Classification`)
    pub const CLASSIFICATION: &str = "classification";
    /// Configuration plan (`ConfigPlan`)
    pub const CONFIG_PLAN: &str = "config_plan";
    /// Reachable host address of the server (String)
    pub const SERVER_IP: &str = "server_ip";
    /// Current BIOS attributes (map of attribute → value)
    pub const BIOS_CURRENT: &str = "bios_current";
    /// Target BIOS attributes to push (map of attribute → value)
    pub const BIOS_TARGET: &str = "bios_target";
    /// Ordered pending firmware updates (`Vec<FirmwareUpdate>`)
    pub const FIRMWARE_UPDATES: &str = "firmware_updates";
}

/// Shared slot holding the most recent sub-task note
pub(crate) type SubTaskSlot = Arc<Mutex<Option<String>>>;

/// Execution context shared by all steps of one workflow
pub struct Context {
    /// Workflow this context belongs to
    pub workflow_id: String,

    /// Correlation id carried into adapter spans
    pub correlation_id: Uuid,

    /// Server the workflow provisions
    pub server_id: String,

    /// Device type; may be unresolved until classification runs
    pub device_type: Option<String>,

    /// Classification confidence, when classification ran
    pub confidence: Option<Confidence>,

    /// Address to program into the BMC, when requested
    pub target_ipmi_ip: Option<String>,

    /// Gateway to program into the BMC, when requested
    pub gateway: Option<String>,

    /// Name of the credentials entry adapters resolve
    pub credentials_ref: String,

    /// Whether classification may overwrite a supplied device type
    pub reclassify_policy: ReclassifyPolicy,

    extras: HashMap<String, serde_json::Value>,
    catalog: Arc<Catalog>,
    adapters: Arc<CapabilityRegistry>,
    cancel: CancelObserver,
    bus: Arc<ProgressBus>,
    sub_task: SubTaskSlot,
    current_step: Option<(usize, String)>,
}

impl Context {
    /// Create a context for one workflow
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        server_id: impl Into<String>,
        credentials_ref: impl Into<String>,
        catalog: Arc<Catalog>,
        adapters: Arc<CapabilityRegistry>,
        cancel: CancelObserver,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            correlation_id: Uuid::now_v7(),
            server_id: server_id.into(),
            device_type: None,
            confidence: None,
            target_ipmi_ip: None,
            gateway: None,
            credentials_ref: credentials_ref.into(),
            reclassify_policy: ReclassifyPolicy::default(),
            extras: HashMap::new(),
            catalog,
            adapters,
            cancel,
            bus,
            sub_task: Arc::new(Mutex::new(None)),
            current_step: None,
        }
    }

    /// Set the caller-supplied device type
    #[must_use]
    pub fn with_device_type(mut self, device_type: Option<String>) -> Self {
        self.device_type = device_type;
        self
    }

    /// Set BMC network targets
    #[must_use]
    pub fn with_ipmi_target(
        mut self,
        target_ipmi_ip: Option<String>,
        gateway: Option<String>,
    ) -> Self {
        self.target_ipmi_ip = target_ipmi_ip;
        self.gateway = gateway;
        self
    }

    /// Set the reclassification policy
    #[must_use]
    pub fn with_reclassify_policy(mut self, policy: ReclassifyPolicy) -> Self {
        self.reclassify_policy = policy;
        self
    }

    /// Seed free-form extras (from the create request)
    #[must_use]
    pub fn with_extras(mut self, extras: HashMap<String, serde_json::Value>) -> Self {
        self.extras = extras;
        self
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// The catalog snapshot captured at workflow start
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The capability adapters
    #[must_use]
    pub fn adapters(&self) -> &CapabilityRegistry {
        &self.adapters
    }

    /// Shared handle to the capability adapters, for bounded worker fan-out
    #[must_use]
    pub fn adapters_arc(&self) -> Arc<CapabilityRegistry> {
        Arc::clone(&self.adapters)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Whether cancellation has been signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone the cancellation observer, for racing long waits
    #[must_use]
    pub fn cancel_observer(&self) -> CancelObserver {
        self.cancel.clone()
    }

    // =========================================================================
    // Sub-task Reporting
    // =========================================================================

    /// Report a sub-task note for operator visibility
    ///
    /// Publishing is also a cancellation-safe checkpoint: steps are expected
    /// to call this at their natural progress points.
    pub async fn report_sub_task(&self, text: impl Into<String>) {
        let text = text.into();

        {
            let mut slot = self.sub_task.lock().expect("sub-task slot poisoned");
            *slot = Some(text.clone());
        }

        let event = match &self.current_step {
            Some((index, name)) => {
                ProgressEvent::step(&self.workflow_id, ProgressKind::SubTask, *index, name)
            }
            None => ProgressEvent::workflow(&self.workflow_id, ProgressKind::SubTask),
        };
        self.bus.publish(event.with_payload(text)).await;
    }

    /// Engine hook: mark which step is about to run
    pub(crate) fn begin_step(&mut self, index: usize, name: &str) {
        self.current_step = Some((index, name.to_string()));
        let mut slot = self.sub_task.lock().expect("sub-task slot poisoned");
        *slot = None;
    }

    /// Shared slot the manager reads for status snapshots
    pub(crate) fn sub_task_slot(&self) -> SubTaskSlot {
        Arc::clone(&self.sub_task)
    }

    // =========================================================================
    // Typed Extras
    // =========================================================================

    /// Store a value under a well-known key
    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StepError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StepError::internal(format!("context value '{key}' not serializable: {e}")))?;
        self.extras.insert(key.to_string(), value);
        Ok(())
    }

    /// Fetch a value, `None` when absent or of the wrong shape
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extras
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Fetch a value a step cannot run without
    ///
    /// A missing key means the template was composed wrong, which is an
    /// orchestrator bug, not an operational failure.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StepError> {
        self.get(key)
            .ok_or_else(|| StepError::internal(format!("required context key '{key}' missing")))
    }

    /// Raw access for metadata snapshots
    #[must_use]
    pub fn extras(&self) -> &HashMap<String, serde_json::Value> {
        &self.extras
    }
}
