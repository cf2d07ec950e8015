//! Intelligent-configuration planner step

use async_trait::async_trait;

use metalforge_catalog::CatalogError;
use metalforge_domain::{ConfigPlan, ErrorKind, PlanStrategy, StepError, StepOutcome};

use crate::context::{keys, Context};
use crate::step::Step;

/// Build the configuration plan the BIOS and firmware steps consume
///
/// Emits an intelligent plan when a device type is known with sufficient
/// confidence; otherwise a safe fallback plan.
pub struct PlanIntelligentConfiguration;

#[async_trait]
impl Step for PlanIntelligentConfiguration {
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError> {
        let plan = plan_for(ctx)?;

        match plan.strategy {
            PlanStrategy::Intelligent => {
                ctx.report_sub_task(format!(
                    "planned configuration for {} (template {})",
                    plan.device_type.as_deref().unwrap_or("unknown"),
                    plan.bios_template.as_deref().unwrap_or("none"),
                ))
                .await;
            }
            PlanStrategy::Fallback => {
                ctx.report_sub_task("classification confidence too low; using fallback plan")
                    .await;
            }
        }

        ctx.insert(keys::CONFIG_PLAN, &plan)?;
        Ok(StepOutcome::Done)
    }
}

/// Derive the configuration plan from the context and catalog
///
/// Also used directly by the BIOS steps when a template omits the planner:
/// the same resolution rules apply either way.
pub(crate) fn plan_for(ctx: &Context) -> Result<ConfigPlan, StepError> {
    let Some(device_type_id) = ctx.device_type.clone() else {
        return Ok(ConfigPlan::fallback());
    };

    // An operator-supplied device type carries no confidence value and is
    // trusted as-is; a classified one must clear the confidence floor.
    if let Some(confidence) = ctx.confidence {
        if !confidence.supports_intelligent_plan() {
            return Ok(ConfigPlan::fallback());
        }
    }

    let catalog = ctx.catalog();
    let device_type = catalog
        .get_device_type(&device_type_id)
        .map_err(catalog_error)?;

    // The load-time warning hardens here: a template an active workflow
    // needs must resolve.
    if let Some(template) = &device_type.bios_template {
        catalog.require_bios_template(template).map_err(catalog_error)?;
    }

    let preserve_settings = device_type
        .preserve_settings
        .as_deref()
        .map(|name| catalog.preserve_list(name))
        .unwrap_or_default();

    let firmware_methods = catalog
        .get_firmware_methods(&device_type_id)
        .map_err(catalog_error)?
        .into_iter()
        .map(|(component, descriptor)| (component, descriptor.method))
        .collect();

    let boot_order = if device_type.boot_config.boot_order.is_empty() {
        vec!["pxe".to_string(), "disk".to_string()]
    } else {
        device_type.boot_config.boot_order.clone()
    };

    Ok(ConfigPlan {
        device_type: Some(device_type_id),
        bios_template: device_type.bios_template,
        preserve_settings,
        firmware_methods,
        boot_order,
        reboot_after_bios_push: true,
        strategy: PlanStrategy::Intelligent,
    })
}

fn catalog_error(err: CatalogError) -> StepError {
    match err {
        CatalogError::NotFound(detail) => StepError::new(ErrorKind::NotFound, detail),
        other => StepError::new(ErrorKind::ConfigInvalid, other.to_string()),
    }
}
