//! Intelligent-configuration plan emitted by the planner step

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How the plan was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    /// Built from a classified device type with sufficient confidence
    Intelligent,
    /// Safe defaults; classification confidence was low or absent
    Fallback,
}

/// One pending firmware update, ordered for application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareUpdate {
    /// Component tag (e.g. "bmc", "bios", "nic")
    pub component: String,

    /// Version currently reported by the device
    pub current_version: String,

    /// Version the catalog tracks as latest
    pub target_version: String,

    /// Update method tag (e.g. "redfish_multipart", "vendor_tool")
    pub method: String,

    /// Artifact locator for the update payload
    pub artifact: String,
}

/// Configuration plan consumed by the BIOS and firmware steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPlan {
    /// Device type the plan was built for, if classified
    pub device_type: Option<String>,

    /// BIOS template to apply, when one is resolved
    pub bios_template: Option<String>,

    /// BIOS attributes whose current values must survive a push
    pub preserve_settings: Vec<String>,

    /// Per-component firmware update method (component → method tag)
    pub firmware_methods: BTreeMap<String, String>,

    /// Boot order to program
    pub boot_order: Vec<String>,

    /// Whether the BIOS push is followed by a controlled reboot
    pub reboot_after_bios_push: bool,

    /// How the plan was derived
    pub strategy: PlanStrategy,
}

impl ConfigPlan {
    /// Safe-defaults plan used when classification cannot be trusted
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            device_type: None,
            bios_template: None,
            preserve_settings: Vec::new(),
            firmware_methods: BTreeMap::new(),
            boot_order: vec!["pxe".to_string(), "disk".to_string()],
            reboot_after_bios_push: true,
            strategy: PlanStrategy::Fallback,
        }
    }

    /// Whether the plan came from a trusted classification
    #[must_use]
    pub fn is_intelligent(&self) -> bool {
        self.strategy == PlanStrategy::Intelligent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_plan_is_safe() {
        let plan = ConfigPlan::fallback();
        assert!(!plan.is_intelligent());
        assert!(plan.bios_template.is_none());
        assert_eq!(plan.boot_order, vec!["pxe", "disk"]);
    }

    #[test]
    fn test_plan_serialization() {
        let plan = ConfigPlan::fallback();
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("fallback"));

        let parsed: ConfigPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plan);
    }
}
