//! Redfish BMC contract

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Chassis power operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    On,
    Off,
    Restart,
    PowerCycle,
}

/// One entry from the firmware inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareComponent {
    /// Component tag (e.g. "bmc", "bios", "nic")
    pub component: String,
    pub version: String,
}

/// Progress of a multipart firmware update task
#[derive(Debug, Clone, PartialEq)]
pub enum FirmwareTaskState {
    Running { percent: u8 },
    Done,
    Failed { detail: String },
}

/// Basic system information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub manufacturer: String,
    pub model: String,
    pub power_state: String,
}

/// Redfish service operations against one BMC target
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedfishClient: Send + Sync {
    /// Issue a chassis power action
    async fn power(&self, target: &str, action: PowerAction) -> Result<(), AdapterError>;

    /// Read all BIOS attributes
    async fn get_bios_attributes(
        &self,
        target: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, AdapterError>;

    /// Stage BIOS attribute changes
    async fn set_bios_attributes(
        &self,
        target: &str,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), AdapterError>;

    /// Commit staged BIOS attribute changes
    async fn commit_bios(&self, target: &str) -> Result<(), AdapterError>;

    /// Installed firmware versions
    async fn firmware_inventory(&self, target: &str)
        -> Result<Vec<FirmwareComponent>, AdapterError>;

    /// Start a multipart firmware update; returns a pollable task id
    async fn start_firmware_update(
        &self,
        target: &str,
        component: &str,
        artifact: &str,
    ) -> Result<String, AdapterError>;

    /// Poll the progress of a firmware update task
    async fn firmware_task_progress(
        &self,
        target: &str,
        task_id: &str,
    ) -> Result<FirmwareTaskState, AdapterError>;

    /// Fetch basic system information
    async fn system_info(&self, target: &str) -> Result<SystemInfo, AdapterError>;

    /// Toggle the identify LED
    async fn set_led(&self, target: &str, on: bool) -> Result<(), AdapterError>;
}
