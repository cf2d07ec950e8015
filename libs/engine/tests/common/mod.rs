//! Shared harness for engine scenario tests

use std::sync::Arc;

use metalforge_adapters::stub::StubAdapters;
use metalforge_catalog::{Catalog, CatalogHandle};
use metalforge_db::InMemoryHistoryStore;
use metalforge_engine::{ManagerConfig, WorkflowFactory, WorkflowManager};

/// Catalog used across the scenarios: the stub SSH output matches
/// `a1.c5.large` exactly, and the motherboard tracks firmware ahead of the
/// stub BMC's inventory (bmc 3.10, bios 2.0).
pub const TEST_CATALOG: &str = r#"
vendors:
  supermicro:
    display_name: Supermicro
    aliases: ["Super Micro Computer"]
    firmware_defaults:
      bmc:
        method: redfish_multipart
    motherboards:
      X11DPT-B:
        firmware:
          bmc:
            latest_version: "3.17"
            method: redfish_multipart
            artifact: bmc/smc-3.17.bin
          bios:
            latest_version: "2.1"
            method: redfish_multipart
            artifact: bios/smc-2.1.bin
        device_types:
          a1.c5.large:
            description: dual-socket compute node
            hardware_spec:
              cpu_model: Intel Xeon Gold 6230
              cpu_cores: 40
              memory_gib: 192
            boot_config:
              boot_order: [pxe, disk]
              boot_mode: uefi
            bios_template: compute-defaults
            preserve_settings: network-safe
  hpe:
    display_name: HPE
    motherboards:
      ProLiant-DL380-Gen10:
        device_types:
          h2.m5.xlarge:
            description: HPE storage node
            hardware_spec:
              cpu_model: Intel Xeon Gold 6230
              cpu_cores: 40
bios_templates:
  compute-defaults:
    BootMode: Uefi
    SriovEnable: Enabled
    NicBoot1: Disabled
preserve_settings:
  network-safe: [NicBoot1]
"#;

pub struct Harness {
    pub manager: Arc<WorkflowManager>,
    pub history: Arc<InMemoryHistoryStore>,
    pub stubs: StubAdapters,
}

pub fn harness() -> Harness {
    harness_with(ManagerConfig::default())
}

pub fn harness_with(config: ManagerConfig) -> Harness {
    let stubs = StubAdapters::new();
    let history = Arc::new(InMemoryHistoryStore::new());

    let manager = WorkflowManager::new(
        CatalogHandle::new(Catalog::load(TEST_CATALOG).unwrap()),
        stubs.registry(),
        Arc::clone(&history) as _,
        WorkflowFactory::new(),
        config,
        "default",
    );

    Harness {
        manager: Arc::new(manager),
        history,
        stubs,
    }
}
