//! Catalog document types
//!
//! The YAML shape of the unified vendor/motherboard/device-type database.
//! Top-level keys and the presence of `device_types` are part of the
//! external contract; leaf fields are validated at load time but otherwise
//! extensible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Root Document
// =============================================================================

/// Root catalog document parsed from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CatalogDocument {
    /// Vendors keyed by lowercase vendor id
    pub vendors: BTreeMap<String, VendorEntry>,

    /// Named BIOS templates (attribute → value) referenced by device types
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bios_templates: BTreeMap<String, BTreeMap<String, serde_json::Value>>,

    /// Named preserve lists referenced by device types
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub preserve_settings: BTreeMap<String, Vec<String>>,
}

// =============================================================================
// Vendor
// =============================================================================

/// One vendor subtree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VendorEntry {
    /// Human-facing vendor name (e.g. "Supermicro")
    pub display_name: String,

    /// Additional strings the vendor is recognized by
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Vendor-default firmware procedures (component → method descriptor)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub firmware_defaults: BTreeMap<String, MethodDescriptor>,

    /// Motherboards keyed by case-sensitive model identifier
    #[serde(default)]
    pub motherboards: BTreeMap<String, MotherboardEntry>,
}

// =============================================================================
// Motherboard
// =============================================================================

/// One motherboard subtree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MotherboardEntry {
    /// Firmware tracking per component (component → tracking record)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub firmware: BTreeMap<String, FirmwareTracking>,

    /// Device types keyed by globally-unique device-type id
    #[serde(default)]
    pub device_types: BTreeMap<String, DeviceTypeEntry>,
}

/// Firmware tracking record for one component of a motherboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FirmwareTracking {
    /// Latest version known to the catalog
    pub latest_version: String,

    /// Update method tag (e.g. "redfish_multipart", "vendor_tool")
    pub method: String,

    /// Artifact locator for the update payload
    pub artifact: String,
}

/// A firmware procedure descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MethodDescriptor {
    /// Method tag
    pub method: String,

    /// Artifact locator, when the method needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,

    /// Version pinned by this descriptor, when tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// =============================================================================
// Device Type
// =============================================================================

/// One device type leaf
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeviceTypeEntry {
    /// Human description (e.g. "1U general compute, dual Xeon Gold")
    pub description: String,

    /// Hardware specification used for classification and search
    #[serde(default)]
    pub hardware_spec: HardwareSpec,

    /// Boot configuration
    #[serde(default)]
    pub boot_config: BootConfig,

    /// Name of the BIOS template to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_template: Option<String>,

    /// Name of the preserve list to honor during BIOS pushes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_settings: Option<String>,
}

/// Hardware specification of a device type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HardwareSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gib: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Boot configuration of a device type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BootConfig {
    /// Ordered boot devices (e.g. ["pxe", "disk"])
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boot_order: Vec<String>,

    /// Firmware boot mode (e.g. "uefi", "legacy")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document_parses() {
        let yaml = r#"
vendors:
  supermicro:
    display_name: Supermicro
    motherboards:
      X11DPT-B:
        device_types:
          a1.c5.large:
            description: dual-socket compute node
"#;
        let doc: CatalogDocument = serde_yml::from_str(yaml).unwrap();
        assert_eq!(doc.vendors.len(), 1);
        let vendor = &doc.vendors["supermicro"];
        assert_eq!(vendor.display_name, "Supermicro");
        assert!(vendor.motherboards["X11DPT-B"]
            .device_types
            .contains_key("a1.c5.large"));
    }

    #[test]
    fn test_unknown_leaf_fields_are_rejected_nowhere() {
        // Leaf extensibility: extra keys inside hardware_spec siblings are
        // tolerated because the entry structs only add optional fields.
        let yaml = r#"
vendors:
  hpe:
    display_name: HPE
    aliases: ["Hewlett-Packard Enterprise"]
    firmware_defaults:
      bmc:
        method: redfish_multipart
    motherboards: {}
"#;
        let doc: CatalogDocument = serde_yml::from_str(yaml).unwrap();
        assert_eq!(
            doc.vendors["hpe"].firmware_defaults["bmc"].method,
            "redfish_multipart"
        );
    }

    #[test]
    fn test_document_yaml_round_trip() {
        let yaml = r#"
vendors:
  supermicro:
    display_name: Supermicro
    firmware_defaults:
      bios:
        method: vendor_tool
    motherboards:
      X11DPT-B:
        firmware:
          bmc:
            latest_version: "3.17"
            method: redfish_multipart
            artifact: bmc/smc-3.17.bin
        device_types:
          a1.c5.large:
            description: dual-socket compute node
            hardware_spec:
              cpu_model: Intel Xeon Gold 6230
              cpu_cores: 40
              memory_gib: 192
            boot_config:
              boot_order: [pxe, disk]
              boot_mode: uefi
            bios_template: compute-defaults
bios_templates:
  compute-defaults:
    BootMode: Uefi
preserve_settings: {}
"#;
        let doc: CatalogDocument = serde_yml::from_str(yaml).unwrap();
        let out = serde_yml::to_string(&doc).unwrap();
        let reparsed: CatalogDocument = serde_yml::from_str(&out).unwrap();
        assert_eq!(reparsed, doc);
    }
}
