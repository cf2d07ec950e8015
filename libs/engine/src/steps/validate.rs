//! Validation and reboot steps used by the firmware-first template

use std::time::Duration;

use async_trait::async_trait;

use metalforge_adapters::PowerAction;
use metalforge_domain::{ErrorKind, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;
use crate::steps::{system_id, target_address};

/// Poll interval while waiting for a host to come back
const POWER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on power-state polls before giving up
const MAX_POWER_POLLS: u32 = 240;

// =============================================================================
// Preflight Validate
// =============================================================================

/// Validate request parameters and locate the machine before touching it
///
/// Populates the server handle and, when known, the server address, so the
/// firmware steps can run before the commissioning-era steps.
pub struct PreflightValidate;

#[async_trait]
impl Step for PreflightValidate {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        if let Some(device_type) = &ctx.device_type {
            ctx.catalog()
                .get_device_type(device_type)
                .map_err(|e| StepError::new(ErrorKind::NotFound, e.to_string()))?;
        }

        let maas = ctx.adapters().maas.clone();
        let machine = maas.get(&ctx.server_id).await.map_err(|err| {
            if err.kind == ErrorKind::NotFound {
                StepError::new(
                    ErrorKind::NotFound,
                    format!("server {} is not enlisted in MaaS", ctx.server_id),
                )
            } else {
                err.into()
            }
        })?;

        ctx.insert(keys::SERVER_HANDLE, &machine.system_id)?;
        if let Some(ip) = machine.ip_addresses.first() {
            ctx.insert(keys::SERVER_IP, ip)?;
        }

        ctx.report_sub_task(format!("machine {} validated", machine.system_id))
            .await;
        Ok(StepOutcome::Done)
    }
}

// =============================================================================
// Controlled Reboot
// =============================================================================

/// Power-cycle the host and wait for it to report back
pub struct ControlledReboot;

#[async_trait]
impl Step for ControlledReboot {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let ip = target_address(ctx)?;
        let redfish = ctx.adapters().redfish.clone();

        ctx.report_sub_task(format!("power-cycling {ip}")).await;
        redfish.power(&ip, PowerAction::PowerCycle).await?;

        let mut polls = 0;
        loop {
            if ctx.is_cancelled() {
                return Err(StepError::cancelled("cancelled while awaiting reboot"));
            }

            let info = redfish.system_info(&ip).await?;
            if info.power_state == "On" {
                ctx.report_sub_task("host is back online").await;
                return Ok(StepOutcome::Done);
            }

            polls += 1;
            if polls >= MAX_POWER_POLLS {
                return Err(StepError::new(
                    ErrorKind::Unreachable,
                    format!("host did not power on within {MAX_POWER_POLLS} polls"),
                ));
            }
            tokio::time::sleep(POWER_POLL_INTERVAL).await;
        }
    }
}

// =============================================================================
// Final Validate
// =============================================================================

/// Verify the finished provisioning state end to end
pub struct FinalValidate;

#[async_trait]
impl Step for FinalValidate {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let system_id = system_id(ctx);
        let maas = ctx.adapters().maas.clone();
        let redfish = ctx.adapters().redfish.clone();

        let machine = maas.get(&system_id).await?;
        if !machine.tags.iter().any(|t| t == "provisioned") {
            return Err(StepError::new(
                ErrorKind::Internal,
                format!("machine {system_id} is missing the provisioned tag"),
            ));
        }

        let ip = target_address(ctx)?;
        let info = redfish.system_info(&ip).await?;
        if info.power_state != "On" {
            return Err(StepError::new(
                ErrorKind::Unreachable,
                format!("host reports power state {}", info.power_state),
            ));
        }

        ctx.report_sub_task("final validation passed").await;
        Ok(StepOutcome::Done)
    }
}
