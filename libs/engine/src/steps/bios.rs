//! BIOS configuration steps: pull, modify, push

use std::collections::BTreeMap;

use async_trait::async_trait;

use metalforge_adapters::PowerAction;
use metalforge_domain::{ErrorKind, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;
use crate::steps::plan::plan_for;
use crate::steps::target_address;

/// BIOS attributes as passed between the BIOS steps
type BiosAttributes = BTreeMap<String, serde_json::Value>;

/// Attribute carrying the programmed boot order
const BOOT_ORDER_ATTRIBUTE: &str = "BootOrder";

// =============================================================================
// Pull
// =============================================================================

/// Read the current BIOS configuration through the vendor tool
///
/// Vendors without pull support yield an empty baseline rather than a
/// failure.
pub struct PullBiosConfig;

#[async_trait]
impl Step for PullBiosConfig {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let ip = target_address(ctx)?;
        let vendor_tool = ctx.adapters().vendor_tool.clone();

        ctx.report_sub_task(format!("reading BIOS configuration from {ip}"))
            .await;

        let current: BiosAttributes = match vendor_tool.pull_bios(&ip).await {
            Ok(blob) => parse_blob(&blob),
            Err(err) if err.kind == ErrorKind::NotFound => {
                ctx.report_sub_task("vendor does not support BIOS pull; using empty baseline")
                    .await;
                BiosAttributes::new()
            }
            Err(err) => return Err(err.into()),
        };

        ctx.report_sub_task(format!("captured {} BIOS attributes", current.len()))
            .await;
        ctx.insert(keys::BIOS_CURRENT, &current)?;
        Ok(StepOutcome::Done)
    }
}

/// Parse a vendor blob, wrapping non-JSON payloads opaquely
fn parse_blob(blob: &str) -> BiosAttributes {
    serde_json::from_str(blob).unwrap_or_else(|_| {
        BiosAttributes::from([("_raw".to_string(), serde_json::json!(blob))])
    })
}

// =============================================================================
// Modify
// =============================================================================

/// Merge the planned BIOS template over the current configuration
///
/// Pure: template attributes overwrite current values except those on the
/// preserve list, whose existing values survive.
pub struct ModifyBiosConfig;

#[async_trait]
impl Step for ModifyBiosConfig {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let current: BiosAttributes = ctx.require(keys::BIOS_CURRENT)?;

        // Templates composed without the planner step resolve the same plan
        // inline.
        let plan = match ctx.get(keys::CONFIG_PLAN) {
            Some(plan) => plan,
            None => plan_for(ctx)?,
        };

        let mut target = current.clone();

        if let Some(template_name) = &plan.bios_template {
            let template = ctx
                .catalog()
                .require_bios_template(template_name)
                .map_err(|e| StepError::new(ErrorKind::ConfigInvalid, e.to_string()))?;

            for (attribute, value) in template {
                let preserved = plan.preserve_settings.iter().any(|p| p == attribute)
                    && current.contains_key(attribute);
                if !preserved {
                    target.insert(attribute.clone(), value.clone());
                }
            }
            ctx.report_sub_task(format!("applied template {template_name}"))
                .await;
        } else {
            ctx.report_sub_task("no BIOS template planned; keeping current attributes")
                .await;
        }

        target.insert(
            BOOT_ORDER_ATTRIBUTE.to_string(),
            serde_json::json!(plan.boot_order.join(",")),
        );

        ctx.insert(keys::BIOS_TARGET, &target)?;
        Ok(StepOutcome::Done)
    }
}

// =============================================================================
// Push
// =============================================================================

/// Apply the target BIOS configuration through the vendor tool
pub struct PushBiosConfig;

#[async_trait]
impl Step for PushBiosConfig {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let ip = target_address(ctx)?;
        let target: BiosAttributes = ctx.require(keys::BIOS_TARGET)?;
        let vendor_tool = ctx.adapters().vendor_tool.clone();
        let redfish = ctx.adapters().redfish.clone();

        let blob = serde_json::to_string(&target)
            .map_err(|e| StepError::internal(format!("target BIOS not serializable: {e}")))?;

        ctx.report_sub_task(format!("pushing {} BIOS attributes", target.len()))
            .await;
        vendor_tool.push_bios(&ip, &blob).await?;

        let plan = match ctx.get(keys::CONFIG_PLAN) {
            Some(plan) => plan,
            None => plan_for(ctx)?,
        };
        if plan.reboot_after_bios_push {
            ctx.report_sub_task("rebooting to apply BIOS changes").await;
            redfish.power(&ip, PowerAction::Restart).await?;
        }

        Ok(StepOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blob_json() {
        let attrs = parse_blob(r#"{"BootMode":"Legacy"}"#);
        assert_eq!(attrs["BootMode"], serde_json::json!("Legacy"));
    }

    #[test]
    fn test_parse_blob_opaque() {
        let attrs = parse_blob("HPONCFG raw output");
        assert_eq!(attrs["_raw"], serde_json::json!("HPONCFG raw output"));
    }
}
