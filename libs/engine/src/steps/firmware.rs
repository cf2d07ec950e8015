//! Firmware steps: check inventory against the catalog, apply a batch

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use metalforge_adapters::{CapabilityRegistry, FirmwareTaskState};
use metalforge_domain::{ErrorKind, FirmwareUpdate, StepError, StepOutcome};

use crate::cancel::CancelObserver;
use crate::context::{keys, Context};
use crate::step::Step;
use crate::steps::target_address;

/// Poll interval for multipart update tasks
const TASK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Application order: BMC first, BIOS second, everything else after
fn component_rank(component: &str) -> (u8, String) {
    let rank = match component {
        "bmc" => 0,
        "bios" => 1,
        _ => 2,
    };
    (rank, component.to_string())
}

// =============================================================================
// Firmware Check
// =============================================================================

/// Compare installed firmware against the catalog's tracked versions
///
/// Postcondition: the context carries the ordered pending updates
/// (BMC → BIOS → others).
pub struct FirmwareCheck;

#[async_trait]
impl Step for FirmwareCheck {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let ip = target_address(ctx)?;
        let redfish = ctx.adapters().redfish.clone();

        let Some(device_type) = ctx.device_type.clone() else {
            ctx.insert(keys::FIRMWARE_UPDATES, &Vec::<FirmwareUpdate>::new())?;
            return Ok(StepOutcome::skipped(
                "no device type known; firmware tracking unavailable",
            ));
        };

        let methods = ctx
            .catalog()
            .get_firmware_methods(&device_type)
            .map_err(|e| StepError::new(ErrorKind::NotFound, e.to_string()))?;

        ctx.report_sub_task(format!("reading firmware inventory of {ip}"))
            .await;
        let inventory = redfish.firmware_inventory(&ip).await?;

        let mut updates = Vec::new();
        for (component, descriptor) in methods {
            let (Some(target_version), Some(artifact)) =
                (descriptor.version.clone(), descriptor.artifact.clone())
            else {
                // Vendor-default procedures without tracked versions cannot
                // produce an update decision.
                continue;
            };

            let current = inventory
                .iter()
                .find(|c| c.component == component)
                .map(|c| c.version.clone())
                .unwrap_or_default();

            if current != target_version {
                updates.push(FirmwareUpdate {
                    component,
                    current_version: current,
                    target_version,
                    method: descriptor.method,
                    artifact,
                });
            }
        }

        updates.sort_by_key(|u| component_rank(&u.component));

        ctx.report_sub_task(format!("{} firmware update(s) pending", updates.len()))
            .await;
        ctx.insert(keys::FIRMWARE_UPDATES, &updates)?;
        Ok(StepOutcome::Done)
    }
}

// =============================================================================
// Firmware Apply Batch
// =============================================================================

/// Apply the pending firmware updates
///
/// BMC and BIOS updates run strictly in order; the remaining components run
/// as bounded parallel workers that are joined before the step returns. On
/// failure, already-applied updates from this batch are rolled back to
/// their previous versions as the step's compensating action.
pub struct FirmwareApplyBatch;

#[async_trait]
impl Step for FirmwareApplyBatch {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let updates: Vec<FirmwareUpdate> = ctx.require(keys::FIRMWARE_UPDATES)?;
        if updates.is_empty() {
            ctx.report_sub_task("firmware already current").await;
            return Ok(StepOutcome::Done);
        }

        let ip = target_address(ctx)?;
        let adapters = ctx.adapters_arc();
        let cancel = ctx.cancel_observer();

        let (ordered, parallel): (Vec<_>, Vec<_>) = updates
            .into_iter()
            .partition(|u| matches!(u.component.as_str(), "bmc" | "bios"));

        let mut applied: Vec<FirmwareUpdate> = Vec::new();
        let mut failure: Option<StepError> = None;

        for update in ordered {
            if cancel.is_cancelled() {
                failure = Some(StepError::cancelled("cancelled during firmware batch"));
                break;
            }

            ctx.report_sub_task(format!(
                "updating {} {} -> {}",
                update.component, update.current_version, update.target_version,
            ))
            .await;

            match apply_one(&adapters, &cancel, &ip, &update).await {
                Ok(()) => applied.push(update),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if failure.is_none() && !parallel.is_empty() {
            ctx.report_sub_task(format!(
                "applying {} component update(s) in parallel",
                parallel.len(),
            ))
            .await;

            let mut workers = JoinSet::new();
            for update in parallel {
                let adapters = Arc::clone(&adapters);
                let cancel = cancel.clone();
                let ip = ip.clone();
                workers.spawn(async move {
                    let result = apply_one(&adapters, &cancel, &ip, &update).await;
                    (update, result)
                });
            }

            // Join everything before returning, success or not.
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((update, Ok(()))) => applied.push(update),
                    Ok((_, Err(err))) => {
                        if failure.is_none() {
                            failure = Some(err);
                        }
                    }
                    Err(join_err) => {
                        if failure.is_none() {
                            failure = Some(StepError::internal(format!(
                                "firmware worker panicked: {join_err}"
                            )));
                        }
                    }
                }
            }
        }

        match failure {
            None => {
                ctx.report_sub_task(format!("{} update(s) applied", applied.len()))
                    .await;
                Ok(StepOutcome::Done)
            }
            Some(err) => {
                rollback(ctx, &adapters, &cancel, &ip, &applied).await;
                Err(err)
            }
        }
    }
}

/// Apply one firmware update via its planned method
async fn apply_one(
    adapters: &CapabilityRegistry,
    cancel: &CancelObserver,
    ip: &str,
    update: &FirmwareUpdate,
) -> Result<(), StepError> {
    if update.method.contains("vendor") {
        adapters
            .vendor_tool
            .firmware_update(ip, &update.component, &update.artifact)
            .await?;
        return Ok(());
    }

    let task_id = adapters
        .redfish
        .start_firmware_update(ip, &update.component, &update.artifact)
        .await?;

    loop {
        if cancel.is_cancelled() {
            return Err(StepError::cancelled("cancelled while polling firmware task"));
        }

        match adapters
            .redfish
            .firmware_task_progress(ip, &task_id)
            .await?
        {
            FirmwareTaskState::Done => return Ok(()),
            FirmwareTaskState::Failed { detail } => {
                return Err(StepError::new(ErrorKind::IntegrityFailure, detail));
            }
            FirmwareTaskState::Running { .. } => {
                tokio::time::sleep(TASK_POLL_INTERVAL).await;
            }
        }
    }
}

/// Best-effort compensation: re-apply the previous versions of this batch
async fn rollback(
    ctx: &Context,
    adapters: &CapabilityRegistry,
    cancel: &CancelObserver,
    ip: &str,
    applied: &[FirmwareUpdate],
) {
    for update in applied.iter().rev() {
        ctx.report_sub_task(format!(
            "rolling back {} to {}",
            update.component, update.current_version,
        ))
        .await;

        let rollback_update = FirmwareUpdate {
            component: update.component.clone(),
            current_version: update.target_version.clone(),
            target_version: update.current_version.clone(),
            method: update.method.clone(),
            artifact: format!("rollback/{}-{}", update.component, update.current_version),
        };

        if let Err(err) = apply_one(adapters, cancel, ip, &rollback_update).await {
            tracing::warn!(
                component = %update.component,
                error = %err,
                "firmware rollback failed",
            );
        }
    }
}
