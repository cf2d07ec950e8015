//! Workflow factory
//!
//! Composes the canonical provisioning templates out of the step library
//! and applies per-step policy (retries, timeouts, operator overrides).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::step::StepSpec;
use crate::steps::{
    ClassifyDeviceType, CommissionViaMaas, ControlledReboot, EnhancedDiscoverHardware,
    FinalValidate, FinalizeAndTag, FirmwareApplyBatch, FirmwareCheck, ModifyBiosConfig,
    PlanIntelligentConfiguration, PreflightValidate, PullBiosConfig, PushBiosConfig,
    RetrieveServerIp, UpdateIpmiConfig,
};

/// Straight-through provisioning template
pub const BASIC_PROVISIONING: &str = "basic_provisioning";

/// Firmware-before-configuration template
pub const FIRMWARE_FIRST_PROVISIONING: &str = "firmware_first_provisioning";

/// Discovery-and-classification-driven template
pub const INTELLIGENT_COMMISSIONING: &str = "intelligent_commissioning";

/// Errors raised while building a workflow from a template
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown workflow template: {0}")]
    UnknownTemplate(String),
}

/// Builds step lists for the canonical templates
#[derive(Debug, Clone, Default)]
pub struct WorkflowFactory {
    /// Operator overrides for per-step timeouts
    timeouts: HashMap<String, Duration>,
}

impl WorkflowFactory {
    /// Factory with no overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply per-step timeout overrides (step name → timeout)
    #[must_use]
    pub fn with_step_timeouts(mut self, timeouts: HashMap<String, Duration>) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Names of the known templates
    #[must_use]
    pub fn templates() -> [&'static str; 3] {
        [
            BASIC_PROVISIONING,
            FIRMWARE_FIRST_PROVISIONING,
            INTELLIGENT_COMMISSIONING,
        ]
    }

    /// Build the ordered step list for a template
    ///
    /// `firmware_first` selects the firmware path inside
    /// `intelligent_commissioning`; the firmware-first template implies it.
    pub fn build(
        &self,
        template: &str,
        firmware_first: bool,
    ) -> Result<Vec<StepSpec>, FactoryError> {
        let steps = match template {
            BASIC_PROVISIONING => {
                let mut steps = vec![commission()];
                steps.extend(provisioning_tail());
                steps
            }
            FIRMWARE_FIRST_PROVISIONING => {
                let mut steps = vec![preflight()];
                steps.extend(firmware_block());
                steps.extend(provisioning_tail());
                steps.push(final_validate());
                steps
            }
            INTELLIGENT_COMMISSIONING => {
                let mut steps = vec![commission(), discover(), classify(), plan()];
                if firmware_first {
                    steps.extend(firmware_block());
                }
                steps.extend(provisioning_tail());
                steps
            }
            other => return Err(FactoryError::UnknownTemplate(other.to_string())),
        };

        Ok(steps
            .into_iter()
            .map(|spec| self.apply_overrides(spec))
            .collect())
    }

    fn apply_overrides(&self, spec: StepSpec) -> StepSpec {
        match self.timeouts.get(&spec.name) {
            Some(timeout) => spec.with_timeout(*timeout),
            None => spec,
        }
    }
}

// =============================================================================
// Step Constructors
// =============================================================================

fn commission() -> StepSpec {
    StepSpec::new(
        "commission_via_maas",
        "Commission the server through the MaaS controller",
        Arc::new(CommissionViaMaas),
    )
    .with_retries(2)
}

fn discover() -> StepSpec {
    StepSpec::new(
        "enhanced_discover_hardware",
        "Gather hardware facts over SSH and vendor tooling",
        Arc::new(EnhancedDiscoverHardware),
    )
    .with_retries(2)
}

fn classify() -> StepSpec {
    StepSpec::new(
        "classify_device_type",
        "Classify discovered hardware against the catalog",
        Arc::new(ClassifyDeviceType),
    )
    .with_timeout(Duration::from_secs(60))
}

fn plan() -> StepSpec {
    StepSpec::new(
        "plan_intelligent_configuration",
        "Plan BIOS, firmware and boot configuration",
        Arc::new(PlanIntelligentConfiguration),
    )
    .with_timeout(Duration::from_secs(60))
}

fn retrieve_ip() -> StepSpec {
    StepSpec::new(
        "retrieve_server_ip",
        "Resolve and verify the server's address",
        Arc::new(RetrieveServerIp),
    )
    .with_retries(2)
}

fn pull_bios() -> StepSpec {
    StepSpec::new(
        "pull_bios_config",
        "Read the current BIOS configuration",
        Arc::new(PullBiosConfig),
    )
    .with_retries(2)
}

fn modify_bios() -> StepSpec {
    StepSpec::new(
        "modify_bios_config",
        "Merge the planned BIOS template over the current configuration",
        Arc::new(ModifyBiosConfig),
    )
    .with_timeout(Duration::from_secs(60))
}

fn push_bios() -> StepSpec {
    StepSpec::new(
        "push_bios_config",
        "Apply the target BIOS configuration",
        Arc::new(PushBiosConfig),
    )
    .with_retries(1)
}

fn firmware_check() -> StepSpec {
    StepSpec::new(
        "firmware_check",
        "Compare installed firmware against tracked versions",
        Arc::new(FirmwareCheck),
    )
    .with_retries(2)
}

fn firmware_apply() -> StepSpec {
    StepSpec::new(
        "firmware_apply_batch",
        "Apply pending firmware updates",
        Arc::new(FirmwareApplyBatch),
    )
    .with_timeout(Duration::from_secs(1800))
}

fn update_ipmi() -> StepSpec {
    StepSpec::new(
        "update_ipmi_config",
        "Program the BMC network settings",
        Arc::new(UpdateIpmiConfig),
    )
    .with_retries(2)
}

fn finalize_tag() -> StepSpec {
    StepSpec::new(
        "finalize_and_tag",
        "Tag the machine and complete its record",
        Arc::new(FinalizeAndTag),
    )
    .with_retries(2)
}

fn preflight() -> StepSpec {
    StepSpec::new(
        "preflight_validate",
        "Validate parameters and locate the machine",
        Arc::new(PreflightValidate),
    )
    .with_retries(1)
}

fn controlled_reboot() -> StepSpec {
    StepSpec::new(
        "controlled_reboot",
        "Power-cycle the host and wait for it to return",
        Arc::new(ControlledReboot),
    )
    .with_retries(1)
}

fn final_validate() -> StepSpec {
    StepSpec::new(
        "final_validate",
        "Verify the finished provisioning state",
        Arc::new(FinalValidate),
    )
    .with_retries(1)
}

/// The provisioning tail shared by every template (commissioning excluded)
fn provisioning_tail() -> Vec<StepSpec> {
    vec![
        retrieve_ip(),
        pull_bios(),
        modify_bios(),
        push_bios(),
        update_ipmi(),
        finalize_tag(),
    ]
}

/// The firmware block used by the firmware-first paths
fn firmware_block() -> Vec<StepSpec> {
    vec![firmware_check(), firmware_apply(), controlled_reboot()]
}
