//! Canonical step library
//!
//! Every step follows the uniform contract: validate the context keys it
//! consumes at entry, do its work through the capability adapters, report
//! sub-tasks at its natural progress points, and raise typed errors the
//! engine classifies.

mod bios;
mod classify;
mod commission;
mod discover;
mod finalize;
mod firmware;
mod network;
mod plan;
mod validate;

pub use bios::{ModifyBiosConfig, PullBiosConfig, PushBiosConfig};
pub use classify::ClassifyDeviceType;
pub use commission::CommissionViaMaas;
pub use discover::EnhancedDiscoverHardware;
pub use finalize::FinalizeAndTag;
pub use firmware::{FirmwareApplyBatch, FirmwareCheck};
pub use network::{RetrieveServerIp, UpdateIpmiConfig};
pub use plan::PlanIntelligentConfiguration;
pub use validate::{ControlledReboot, FinalValidate, PreflightValidate};

use metalforge_domain::{StepError, ErrorKind};

use crate::context::{keys, Context};

/// Address used to reach the server, as populated by earlier steps
///
/// Falls back to the requested BMC address so the firmware-first template
/// can talk to the BMC before an OS address is known.
pub(crate) fn target_address(ctx: &Context) -> Result<String, StepError> {
    if let Some(ip) = ctx.get::<String>(keys::SERVER_IP) {
        return Ok(ip);
    }
    if let Some(ip) = ctx.target_ipmi_ip.clone() {
        return Ok(ip);
    }
    Err(StepError::new(
        ErrorKind::TransientNetwork,
        "no reachable address known for the target yet",
    ))
}

/// MaaS system id, defaulting to the server id for templates that skip
/// commissioning
pub(crate) fn system_id(ctx: &Context) -> String {
    ctx.get::<String>(keys::SERVER_HANDLE)
        .unwrap_or_else(|| ctx.server_id.clone())
}
