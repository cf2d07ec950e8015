//! Enhanced hardware discovery step

use std::time::Duration;

use async_trait::async_trait;

use metalforge_domain::{ErrorKind, HardwareFacts, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;
use crate::steps::system_id;

/// Command run on the target to read DMI and CPU information
const DISCOVERY_COMMAND: &str = "dmidecode -t system -t processor -t memory";

/// Timeout for individual remote commands
const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Gather hardware facts over SSH, enriched by vendor tooling when present
///
/// Postcondition: the context carries `hw_facts`. On hardware the vendor
/// tool does not support and where generic probes also return nothing, the
/// step is skipped rather than failed.
pub struct EnhancedDiscoverHardware;

#[async_trait]
impl Step for EnhancedDiscoverHardware {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let system_id = system_id(ctx);
        let maas = ctx.adapters().maas.clone();
        let ssh = ctx.adapters().ssh.clone();
        let vendor_tool = ctx.adapters().vendor_tool.clone();

        let machine = maas.get(&system_id).await?;
        let host = machine.ip_addresses.first().cloned().ok_or_else(|| {
            StepError::new(
                ErrorKind::TransientNetwork,
                format!("machine {system_id} has no address yet"),
            )
        })?;

        ctx.report_sub_task(format!("connecting to {host}")).await;
        let session = ssh.connect(&host, "root", &ctx.credentials_ref).await?;

        let output = session.exec(DISCOVERY_COMMAND, EXEC_TIMEOUT).await?;
        if !output.success() {
            if output.stderr.contains("command not found") {
                // Try to install the probe once; the retry budget covers the
                // next attempt finding it in place.
                ctx.report_sub_task("dmidecode missing; attempting install")
                    .await;
                let _ = session
                    .exec("apt-get install -y dmidecode", Duration::from_secs(120))
                    .await;
                session.close().await;
                return Err(StepError::new(
                    ErrorKind::CommandMissing,
                    "dmidecode unavailable on target; install attempted",
                ));
            }
            session.close().await;
            return Err(StepError::new(
                ErrorKind::SshTransient,
                format!("discovery command exited {}", output.exit_code),
            ));
        }

        let facts = parse_facts(&output.stdout);

        // Vendor enrichment is best-effort: unsupported hardware only skips
        // the step when the generic probes also found nothing.
        match vendor_tool.probe(&host).await {
            Ok(vendor) => {
                ctx.report_sub_task(format!("vendor tooling reports {vendor}"))
                    .await;
            }
            Err(err) if err.kind == ErrorKind::NotFound => {
                if facts.is_empty() {
                    session.close().await;
                    return Ok(StepOutcome::skipped(
                        "vendor tooling does not support this platform",
                    ));
                }
                ctx.report_sub_task("vendor tooling unavailable; using generic facts")
                    .await;
            }
            Err(err) => {
                session.close().await;
                return Err(err.into());
            }
        }

        session.close().await;

        if facts.is_empty() {
            return Err(StepError::new(
                ErrorKind::SshTransient,
                "discovery produced no usable facts",
            ));
        }

        ctx.report_sub_task(format!(
            "discovered {} / {}",
            facts.manufacturer.as_deref().unwrap_or("unknown vendor"),
            facts.product_name.as_deref().unwrap_or("unknown board"),
        ))
        .await;
        ctx.insert(keys::HW_FACTS, &facts)?;

        Ok(StepOutcome::Done)
    }
}

/// Parse `Key: Value` discovery output into hardware facts
fn parse_facts(stdout: &str) -> HardwareFacts {
    let mut facts = HardwareFacts::default();

    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.trim() {
            "Manufacturer" => facts.manufacturer = Some(value.to_string()),
            "Product Name" => facts.product_name = Some(value.to_string()),
            "CPU Model" | "Version" => {
                if facts.cpu_model.is_none() {
                    facts.cpu_model = Some(value.to_string());
                }
            }
            "CPU Cores" | "Core Count" => facts.cpu_cores = value.parse().ok(),
            "Memory Total" => facts.memory_total_gib = value.parse().ok(),
            _ => {}
        }
    }

    facts
}
