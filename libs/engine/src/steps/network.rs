//! Network-facing steps: server address retrieval and BMC reconfiguration

use async_trait::async_trait;

use metalforge_adapters::LanSettings;
use metalforge_domain::{ErrorKind, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;
use crate::steps::system_id;

/// BMC LAN channel programmed by the orchestrator
const LAN_CHANNEL: u8 = 1;

// =============================================================================
// Retrieve Server IP
// =============================================================================

/// Resolve the server's reachable address from MaaS and verify it
///
/// Postcondition: the context carries `server_ip` and an SSH connection to
/// it has succeeded once.
pub struct RetrieveServerIp;

#[async_trait]
impl Step for RetrieveServerIp {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let system_id = system_id(ctx);
        let maas = ctx.adapters().maas.clone();
        let ssh = ctx.adapters().ssh.clone();

        let machine = maas.get(&system_id).await?;
        let ip = machine.ip_addresses.first().cloned().ok_or_else(|| {
            StepError::new(
                ErrorKind::TransientNetwork,
                format!("machine {system_id} has no address assigned yet"),
            )
        })?;

        ctx.report_sub_task(format!("verifying reachability of {ip}"))
            .await;
        let session = ssh.connect(&ip, "root", &ctx.credentials_ref).await?;
        session.close().await;

        ctx.insert(keys::SERVER_IP, &ip)?;
        Ok(StepOutcome::Done)
    }
}

// =============================================================================
// Update IPMI Config
// =============================================================================

/// Program the BMC's network settings
///
/// Skips itself when the request carried no target BMC address.
pub struct UpdateIpmiConfig;

#[async_trait]
impl Step for UpdateIpmiConfig {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let Some(target_ip) = ctx.target_ipmi_ip.clone() else {
            return Ok(StepOutcome::skipped("no BMC address change requested"));
        };

        let ipmi = ctx.adapters().ipmi.clone();

        // Talk to the BMC wherever it currently answers; fall back to the
        // target address for first-time configuration.
        let current = ctx
            .get::<String>(keys::SERVER_IP)
            .unwrap_or_else(|| target_ip.clone());

        let settings = LanSettings {
            ip_address: Some(target_ip.clone()),
            netmask: None,
            gateway: ctx.gateway.clone(),
        };

        ctx.report_sub_task(format!("programming BMC lan channel {LAN_CHANNEL}"))
            .await;
        ipmi.lan_set(&current, LAN_CHANNEL, settings).await?;

        let applied = ipmi.lan_get(&current, LAN_CHANNEL).await?;
        if applied.ip_address.as_deref() != Some(target_ip.as_str()) {
            return Err(StepError::new(
                ErrorKind::Transient,
                "BMC did not report the programmed address back",
            ));
        }

        ctx.report_sub_task(format!("BMC now configured for {target_ip}"))
            .await;
        Ok(StepOutcome::Done)
    }
}
