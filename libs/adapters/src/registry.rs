//! Bundle of capability adapters handed to workflow steps

use std::sync::Arc;

use crate::ipmi::IpmiClient;
use crate::maas::MaasClient;
use crate::redfish::RedfishClient;
use crate::ssh::SshClient;
use crate::vendor::VendorTool;

/// All capabilities a workflow step may use
///
/// Steps borrow this through their context; the registry owns nothing but
/// shared handles, so cloning is cheap.
#[derive(Clone)]
pub struct CapabilityRegistry {
    pub maas: Arc<dyn MaasClient>,
    pub ssh: Arc<dyn SshClient>,
    pub redfish: Arc<dyn RedfishClient>,
    pub ipmi: Arc<dyn IpmiClient>,
    pub vendor_tool: Arc<dyn VendorTool>,
}

impl CapabilityRegistry {
    /// Assemble a registry from individual adapters
    #[must_use]
    pub fn new(
        maas: Arc<dyn MaasClient>,
        ssh: Arc<dyn SshClient>,
        redfish: Arc<dyn RedfishClient>,
        ipmi: Arc<dyn IpmiClient>,
        vendor_tool: Arc<dyn VendorTool>,
    ) -> Self {
        Self {
            maas,
            ssh,
            redfish,
            ipmi,
            vendor_tool,
        }
    }
}
