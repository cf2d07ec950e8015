//! Deterministic stub adapters
//!
//! In-memory implementations of every capability contract, with scripted
//! failure and latency injection. The scenario tests and the CLI dry-run
//! mode both run against these.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::ipmi::{IpmiClient, LanSettings};
use crate::maas::{MaasClient, Machine, MachineStatus};
use crate::redfish::{
    FirmwareComponent, FirmwareTaskState, PowerAction, RedfishClient, SystemInfo,
};
use crate::registry::CapabilityRegistry;
use crate::ssh::{ExecOutput, SshClient, SshSession};
use crate::vendor::VendorTool;

// =============================================================================
// Fault Injection
// =============================================================================

/// Scripted faults and latency, keyed by operation name
///
/// Operation names are `<adapter>.<method>`, e.g. `"vendor.pull_bios"`.
#[derive(Default)]
pub struct FaultInjector {
    faults: Mutex<HashMap<String, VecDeque<AdapterError>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FaultInjector {
    /// Queue `times` copies of `error` for the next calls to `op`
    pub fn inject(&self, op: &str, error: AdapterError, times: usize) {
        let mut faults = self.faults.lock().expect("fault injector poisoned");
        let queue = faults.entry(op.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Delay every call to `op` by `delay`
    pub fn delay(&self, op: &str, delay: Duration) {
        self.delays
            .lock()
            .expect("fault injector poisoned")
            .insert(op.to_string(), delay);
    }

    /// Apply latency, then pop and return the next scripted fault, if any
    async fn gate(&self, op: &str) -> Result<(), AdapterError> {
        let delay = self
            .delays
            .lock()
            .expect("fault injector poisoned")
            .get(op)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fault = self
            .faults
            .lock()
            .expect("fault injector poisoned")
            .get_mut(op)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Stub MaaS
// =============================================================================

/// In-memory MaaS controller
pub struct StubMaas {
    injector: Arc<FaultInjector>,
    machines: Mutex<HashMap<String, Machine>>,
}

impl StubMaas {
    fn new(injector: Arc<FaultInjector>) -> Self {
        Self {
            injector,
            machines: Mutex::new(HashMap::new()),
        }
    }

    fn machine_for(system_id: &str) -> Machine {
        Machine {
            system_id: system_id.to_string(),
            hostname: format!("node-{system_id}"),
            status: MachineStatus::Ready,
            ip_addresses: vec!["10.20.0.100".to_string()],
            tags: Vec::new(),
        }
    }
}

#[async_trait]
impl MaasClient for StubMaas {
    async fn list_machines(&self) -> Result<Vec<Machine>, AdapterError> {
        self.injector.gate("maas.list_machines").await?;
        let machines = self.machines.lock().expect("stub maas poisoned");
        Ok(machines.values().cloned().collect())
    }

    async fn commission(&self, system_id: &str) -> Result<Machine, AdapterError> {
        self.injector.gate("maas.commission").await?;
        let mut machines = self.machines.lock().expect("stub maas poisoned");
        let machine = machines
            .entry(system_id.to_string())
            .or_insert_with(|| Self::machine_for(system_id));
        machine.status = MachineStatus::Ready;
        Ok(machine.clone())
    }

    async fn get(&self, system_id: &str) -> Result<Machine, AdapterError> {
        self.injector.gate("maas.get").await?;
        let machines = self.machines.lock().expect("stub maas poisoned");
        machines
            .get(system_id)
            .cloned()
            .ok_or_else(|| AdapterError::not_found(format!("machine {system_id}")))
    }

    async fn release(&self, system_id: &str) -> Result<(), AdapterError> {
        self.injector.gate("maas.release").await?;
        let mut machines = self.machines.lock().expect("stub maas poisoned");
        if let Some(machine) = machines.get_mut(system_id) {
            machine.status = MachineStatus::New;
        }
        Ok(())
    }

    async fn tag(&self, system_id: &str, tags: &[String]) -> Result<(), AdapterError> {
        self.injector.gate("maas.tag").await?;
        let mut machines = self.machines.lock().expect("stub maas poisoned");
        let machine = machines
            .get_mut(system_id)
            .ok_or_else(|| AdapterError::not_found(format!("machine {system_id}")))?;
        for tag in tags {
            if !machine.tags.contains(tag) {
                machine.tags.push(tag.clone());
            }
        }
        Ok(())
    }
}

// =============================================================================
// Stub SSH
// =============================================================================

const DEFAULT_DMIDECODE_OUTPUT: &str = "\
Manufacturer: Supermicro
Product Name: X11DPT-B
CPU Model: Intel(R) Xeon(R) Gold 6230 CPU @ 2.10GHz
CPU Cores: 40
Memory Total: 192
";

/// In-memory SSH transport
pub struct StubSsh {
    injector: Arc<FaultInjector>,
    /// (command substring → canned output), first match wins
    responses: Arc<Mutex<Vec<(String, ExecOutput)>>>,
}

impl StubSsh {
    fn new(injector: Arc<FaultInjector>) -> Self {
        let responses = vec![(
            "dmidecode".to_string(),
            ExecOutput::ok(DEFAULT_DMIDECODE_OUTPUT),
        )];
        Self {
            injector,
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    /// Prepend a canned response for commands containing `pattern`
    pub fn respond(&self, pattern: &str, output: ExecOutput) {
        self.responses
            .lock()
            .expect("stub ssh poisoned")
            .insert(0, (pattern.to_string(), output));
    }
}

struct StubSession {
    injector: Arc<FaultInjector>,
    responses: Arc<Mutex<Vec<(String, ExecOutput)>>>,
    closed: AtomicBool,
}

#[async_trait]
impl SshSession for StubSession {
    async fn exec(&self, cmd: &str, _timeout: Duration) -> Result<ExecOutput, AdapterError> {
        self.injector.gate("ssh.exec").await?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::ssh_transient("session closed"));
        }

        let responses = self.responses.lock().expect("stub ssh poisoned");
        let output = responses
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map_or_else(|| ExecOutput::ok(""), |(_, output)| output.clone());
        Ok(output)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SshClient for StubSsh {
    async fn connect(
        &self,
        _host: &str,
        _user: &str,
        _key_ref: &str,
    ) -> Result<Box<dyn SshSession>, AdapterError> {
        self.injector.gate("ssh.connect").await?;
        Ok(Box::new(StubSession {
            injector: Arc::clone(&self.injector),
            responses: Arc::clone(&self.responses),
            closed: AtomicBool::new(false),
        }))
    }
}

// =============================================================================
// Stub Redfish
// =============================================================================

#[derive(Default)]
struct RedfishState {
    bios_attributes: BTreeMap<String, serde_json::Value>,
    staged: BTreeMap<String, serde_json::Value>,
    inventory: Vec<FirmwareComponent>,
    tasks: HashMap<String, (String, u8)>,
    power_state: String,
    led_on: bool,
}

/// In-memory Redfish BMC
pub struct StubRedfish {
    injector: Arc<FaultInjector>,
    state: Mutex<RedfishState>,
    task_counter: AtomicU64,
}

impl StubRedfish {
    fn new(injector: Arc<FaultInjector>) -> Self {
        let state = RedfishState {
            bios_attributes: BTreeMap::from([
                ("BootMode".to_string(), serde_json::json!("Legacy")),
                ("SriovEnable".to_string(), serde_json::json!("Disabled")),
            ]),
            inventory: vec![
                FirmwareComponent {
                    component: "bmc".to_string(),
                    version: "3.10".to_string(),
                },
                FirmwareComponent {
                    component: "bios".to_string(),
                    version: "2.0".to_string(),
                },
            ],
            power_state: "On".to_string(),
            ..Default::default()
        };
        Self {
            injector,
            state: Mutex::new(state),
            task_counter: AtomicU64::new(0),
        }
    }

    /// Replace the firmware inventory reported by the BMC
    pub fn set_inventory(&self, inventory: Vec<FirmwareComponent>) {
        self.state.lock().expect("stub redfish poisoned").inventory = inventory;
    }

    /// Last chassis power state
    #[must_use]
    pub fn power_state(&self) -> String {
        self.state
            .lock()
            .expect("stub redfish poisoned")
            .power_state
            .clone()
    }
}

#[async_trait]
impl RedfishClient for StubRedfish {
    async fn power(&self, _target: &str, action: PowerAction) -> Result<(), AdapterError> {
        self.injector.gate("redfish.power").await?;
        let mut state = self.state.lock().expect("stub redfish poisoned");
        state.power_state = match action {
            PowerAction::Off => "Off".to_string(),
            PowerAction::On | PowerAction::Restart | PowerAction::PowerCycle => "On".to_string(),
        };
        Ok(())
    }

    async fn get_bios_attributes(
        &self,
        _target: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, AdapterError> {
        self.injector.gate("redfish.get_bios").await?;
        let state = self.state.lock().expect("stub redfish poisoned");
        Ok(state.bios_attributes.clone())
    }

    async fn set_bios_attributes(
        &self,
        _target: &str,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), AdapterError> {
        self.injector.gate("redfish.set_bios").await?;
        let mut state = self.state.lock().expect("stub redfish poisoned");
        state.staged = attributes;
        Ok(())
    }

    async fn commit_bios(&self, _target: &str) -> Result<(), AdapterError> {
        self.injector.gate("redfish.commit_bios").await?;
        let mut state = self.state.lock().expect("stub redfish poisoned");
        let staged = std::mem::take(&mut state.staged);
        state.bios_attributes.extend(staged);
        Ok(())
    }

    async fn firmware_inventory(
        &self,
        _target: &str,
    ) -> Result<Vec<FirmwareComponent>, AdapterError> {
        self.injector.gate("redfish.firmware_inventory").await?;
        let state = self.state.lock().expect("stub redfish poisoned");
        Ok(state.inventory.clone())
    }

    async fn start_firmware_update(
        &self,
        _target: &str,
        component: &str,
        _artifact: &str,
    ) -> Result<String, AdapterError> {
        self.injector.gate("redfish.start_firmware_update").await?;
        let task_id = format!("task-{}", self.task_counter.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock().expect("stub redfish poisoned");
        state.tasks.insert(task_id.clone(), (component.to_string(), 0));
        Ok(task_id)
    }

    async fn firmware_task_progress(
        &self,
        _target: &str,
        task_id: &str,
    ) -> Result<FirmwareTaskState, AdapterError> {
        self.injector.gate("redfish.firmware_task_progress").await?;
        let mut state = self.state.lock().expect("stub redfish poisoned");
        let Some((component, percent)) = state.tasks.get(task_id).cloned() else {
            return Err(AdapterError::not_found(format!("task {task_id}")));
        };

        if percent >= 100 {
            state.tasks.remove(task_id);
            return Ok(FirmwareTaskState::Done);
        }

        let next = (percent + 50).min(100);
        state.tasks.insert(task_id.to_string(), (component, next));
        Ok(FirmwareTaskState::Running { percent: next })
    }

    async fn system_info(&self, _target: &str) -> Result<SystemInfo, AdapterError> {
        self.injector.gate("redfish.system_info").await?;
        let state = self.state.lock().expect("stub redfish poisoned");
        Ok(SystemInfo {
            manufacturer: "Supermicro".to_string(),
            model: "X11DPT-B".to_string(),
            power_state: state.power_state.clone(),
        })
    }

    async fn set_led(&self, _target: &str, on: bool) -> Result<(), AdapterError> {
        self.injector.gate("redfish.set_led").await?;
        self.state.lock().expect("stub redfish poisoned").led_on = on;
        Ok(())
    }
}

// =============================================================================
// Stub IPMI
// =============================================================================

/// In-memory IPMI endpoint
pub struct StubIpmi {
    injector: Arc<FaultInjector>,
    lan: Mutex<HashMap<(String, u8), LanSettings>>,
}

impl StubIpmi {
    fn new(injector: Arc<FaultInjector>) -> Self {
        Self {
            injector,
            lan: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl IpmiClient for StubIpmi {
    async fn lan_get(&self, target: &str, channel: u8) -> Result<LanSettings, AdapterError> {
        self.injector.gate("ipmi.lan_get").await?;
        let lan = self.lan.lock().expect("stub ipmi poisoned");
        Ok(lan
            .get(&(target.to_string(), channel))
            .cloned()
            .unwrap_or_default())
    }

    async fn lan_set(
        &self,
        target: &str,
        channel: u8,
        settings: LanSettings,
    ) -> Result<(), AdapterError> {
        self.injector.gate("ipmi.lan_set").await?;
        let mut lan = self.lan.lock().expect("stub ipmi poisoned");
        lan.insert((target.to_string(), channel), settings);
        Ok(())
    }

    async fn power(&self, _target: &str, _action: PowerAction) -> Result<(), AdapterError> {
        self.injector.gate("ipmi.power").await
    }

    async fn sel_list(&self, _target: &str) -> Result<Vec<String>, AdapterError> {
        self.injector.gate("ipmi.sel_list").await?;
        Ok(Vec::new())
    }
}

// =============================================================================
// Stub Vendor Tool
// =============================================================================

const DEFAULT_BIOS_BLOB: &str =
    r#"{"BootMode":"Legacy","SriovEnable":"Disabled","NicBoot1":"PXE","NicBoot2":"Disabled"}"#;

/// In-memory vendor tool
///
/// Dependency installation is modeled lazily: the first operation that needs
/// the tool "installs" it, retrying scripted install faults with its own
/// short backoff, exactly once per process.
pub struct StubVendorTool {
    injector: Arc<FaultInjector>,
    vendor_id: Mutex<String>,
    not_applicable: AtomicBool,
    installed: AtomicBool,
    bios_blobs: Mutex<HashMap<String, String>>,
    firmware_applied: Mutex<Vec<(String, String)>>,
}

impl StubVendorTool {
    fn new(injector: Arc<FaultInjector>) -> Self {
        Self {
            injector,
            vendor_id: Mutex::new("supermicro".to_string()),
            not_applicable: AtomicBool::new(false),
            installed: AtomicBool::new(false),
            bios_blobs: Mutex::new(HashMap::new()),
            firmware_applied: Mutex::new(Vec::new()),
        }
    }

    /// Make `probe` report the tool does not apply to the target hardware
    pub fn set_not_applicable(&self, value: bool) {
        self.not_applicable.store(value, Ordering::SeqCst);
    }

    /// Firmware updates applied through this tool, as (component, artifact)
    #[must_use]
    pub fn firmware_applied(&self) -> Vec<(String, String)> {
        self.firmware_applied
            .lock()
            .expect("stub vendor poisoned")
            .clone()
    }

    async fn ensure_installed(&self) -> Result<(), AdapterError> {
        if self.installed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let policy = backoff::ExponentialBackoff {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(100),
            max_elapsed_time: Some(Duration::from_secs(2)),
            ..Default::default()
        };

        let injector = Arc::clone(&self.injector);
        backoff::future::retry(policy, || {
            let injector = Arc::clone(&injector);
            async move {
                injector
                    .gate("vendor.install")
                    .await
                    .map_err(backoff::Error::transient)
            }
        })
        .await?;

        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl VendorTool for StubVendorTool {
    async fn probe(&self, target: &str) -> Result<String, AdapterError> {
        self.injector.gate("vendor.probe").await?;
        if self.not_applicable.load(Ordering::SeqCst) {
            return Err(AdapterError::not_found(format!(
                "vendor tool does not support hardware at {target}"
            )));
        }
        self.ensure_installed().await?;
        Ok(self.vendor_id.lock().expect("stub vendor poisoned").clone())
    }

    async fn pull_bios(&self, target: &str) -> Result<String, AdapterError> {
        self.injector.gate("vendor.pull_bios").await?;
        self.ensure_installed().await?;
        let blobs = self.bios_blobs.lock().expect("stub vendor poisoned");
        Ok(blobs
            .get(target)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIOS_BLOB.to_string()))
    }

    async fn push_bios(&self, target: &str, blob: &str) -> Result<(), AdapterError> {
        self.injector.gate("vendor.push_bios").await?;
        self.ensure_installed().await?;
        let mut blobs = self.bios_blobs.lock().expect("stub vendor poisoned");
        blobs.insert(target.to_string(), blob.to_string());
        Ok(())
    }

    async fn firmware_update(
        &self,
        _target: &str,
        component: &str,
        artifact: &str,
    ) -> Result<(), AdapterError> {
        self.injector.gate("vendor.firmware_update").await?;
        self.ensure_installed().await?;
        self.firmware_applied
            .lock()
            .expect("stub vendor poisoned")
            .push((component.to_string(), artifact.to_string()));
        Ok(())
    }
}

// =============================================================================
// Stub Bundle
// =============================================================================

/// All stub adapters wired to one fault injector
pub struct StubAdapters {
    injector: Arc<FaultInjector>,
    pub maas: Arc<StubMaas>,
    pub ssh: Arc<StubSsh>,
    pub redfish: Arc<StubRedfish>,
    pub ipmi: Arc<StubIpmi>,
    pub vendor_tool: Arc<StubVendorTool>,
}

impl Default for StubAdapters {
    fn default() -> Self {
        Self::new()
    }
}

impl StubAdapters {
    /// Healthy stub set with no scripted faults
    #[must_use]
    pub fn new() -> Self {
        let injector = Arc::new(FaultInjector::default());
        Self {
            maas: Arc::new(StubMaas::new(Arc::clone(&injector))),
            ssh: Arc::new(StubSsh::new(Arc::clone(&injector))),
            redfish: Arc::new(StubRedfish::new(Arc::clone(&injector))),
            ipmi: Arc::new(StubIpmi::new(Arc::clone(&injector))),
            vendor_tool: Arc::new(StubVendorTool::new(Arc::clone(&injector))),
            injector,
        }
    }

    /// The shared fault injector
    #[must_use]
    pub fn injector(&self) -> &Arc<FaultInjector> {
        &self.injector
    }

    /// Assemble a capability registry over these stubs
    #[must_use]
    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        let maas: Arc<dyn MaasClient> = Arc::clone(&self.maas) as Arc<dyn MaasClient>;
        let ssh: Arc<dyn SshClient> = Arc::clone(&self.ssh) as Arc<dyn SshClient>;
        let redfish: Arc<dyn RedfishClient> = Arc::clone(&self.redfish) as Arc<dyn RedfishClient>;
        let ipmi: Arc<dyn IpmiClient> = Arc::clone(&self.ipmi) as Arc<dyn IpmiClient>;
        let vendor_tool: Arc<dyn VendorTool> =
            Arc::clone(&self.vendor_tool) as Arc<dyn VendorTool>;
        Arc::new(CapabilityRegistry::new(maas, ssh, redfish, ipmi, vendor_tool))
    }
}

// =============================================================================
// Tests
// =============================================================================
