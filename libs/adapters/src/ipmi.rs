//! IPMI contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::redfish::PowerAction;

/// BMC LAN channel settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanSettings {
    pub ip_address: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
}

/// IPMI operations against one BMC target
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpmiClient: Send + Sync {
    /// Read LAN settings on a channel
    async fn lan_get(&self, target: &str, channel: u8) -> Result<LanSettings, AdapterError>;

    /// Write LAN settings on a channel
    async fn lan_set(
        &self,
        target: &str,
        channel: u8,
        settings: LanSettings,
    ) -> Result<(), AdapterError>;

    /// Issue a chassis power action
    async fn power(&self, target: &str, action: PowerAction) -> Result<(), AdapterError>;

    /// Read the system event log
    async fn sel_list(&self, target: &str) -> Result<Vec<String>, AdapterError>;
}
