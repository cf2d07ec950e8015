//! Finalization step

use async_trait::async_trait;

use metalforge_domain::{StepError, StepOutcome};

use crate::context::Context;
use crate::step::Step;
use crate::steps::system_id;

/// Tag the machine in MaaS with its provisioning outcome
///
/// The engine's terminal hook completes the history record; this step only
/// marks the machine itself.
pub struct FinalizeAndTag;

#[async_trait]
impl Step for FinalizeAndTag {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let system_id = system_id(ctx);
        let maas = ctx.adapters().maas.clone();

        let mut tags = vec!["provisioned".to_string()];
        if let Some(device_type) = &ctx.device_type {
            tags.push(device_type.clone());
        }

        ctx.report_sub_task(format!("tagging {system_id}: {}", tags.join(", ")))
            .await;
        maas.tag(&system_id, &tags).await?;

        Ok(StepOutcome::Done)
    }
}
