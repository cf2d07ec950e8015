//! MaaS commissioning step

use std::time::Duration;

use async_trait::async_trait;

use metalforge_adapters::MachineStatus;
use metalforge_domain::{ErrorKind, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;

/// Poll interval while waiting for commissioning to finish
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Commission the server through the MaaS controller
///
/// Postcondition: the machine reports Ready and the context carries its
/// system handle.
pub struct CommissionViaMaas;

#[async_trait]
impl Step for CommissionViaMaas {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let maas = ctx.adapters().maas.clone();

        ctx.report_sub_task(format!("commissioning {} via MaaS", ctx.server_id))
            .await;
        let mut machine = maas.commission(&ctx.server_id).await?;

        while machine.status != MachineStatus::Ready {
            if machine.status == MachineStatus::Failed {
                return Err(StepError::new(
                    ErrorKind::Internal,
                    format!("MaaS reports commissioning failed for {}", ctx.server_id),
                ));
            }
            if ctx.is_cancelled() {
                return Err(StepError::cancelled("cancelled while awaiting commissioning"));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
            machine = maas.get(&machine.system_id).await?;
        }

        ctx.insert(keys::SERVER_HANDLE, &machine.system_id)?;
        ctx.report_sub_task(format!("machine {} is ready", machine.system_id))
            .await;

        Ok(StepOutcome::Done)
    }
}
