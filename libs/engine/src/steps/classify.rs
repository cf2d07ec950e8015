//! Device-type classification step

use async_trait::async_trait;

use metalforge_catalog::classify;
use metalforge_domain::{HardwareFacts, ReclassifyPolicy, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;

/// Classify discovered hardware against the catalog
///
/// A caller-supplied device type always wins unless the workflow was
/// created with the always-reclassify policy. Pure: no I/O beyond the
/// captured catalog snapshot.
pub struct ClassifyDeviceType;

#[async_trait]
impl Step for ClassifyDeviceType {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        if ctx.device_type.is_some() && ctx.reclassify_policy == ReclassifyPolicy::KeepExisting {
            ctx.report_sub_task("device type supplied by operator; keeping it")
                .await;
            return Ok(StepOutcome::Done);
        }

        let facts: HardwareFacts = ctx.require(keys::HW_FACTS)?;
        let result = classify(&facts, ctx.catalog());

        match &result.device_type {
            Some(device_type) => {
                ctx.report_sub_task(format!(
                    "classified as {device_type} ({:?} confidence)",
                    result.confidence,
                ))
                .await;
                ctx.device_type = Some(device_type.clone());
                ctx.confidence = Some(result.confidence);
            }
            None => {
                ctx.report_sub_task("no device type matched the discovered hardware")
                    .await;
                ctx.confidence = Some(result.confidence);
            }
        }

        ctx.insert(keys::CLASSIFICATION, &result)?;
        Ok(StepOutcome::Done)
    }
}
