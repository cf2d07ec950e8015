//! Immutable catalog snapshot and resolution queries

use std::collections::BTreeMap;

use crate::document::{
    BootConfig, CatalogDocument, DeviceTypeEntry, HardwareSpec, MethodDescriptor, VendorEntry,
};
use crate::error::CatalogError;

// =============================================================================
// Resolved Device Type
// =============================================================================

/// A device type resolved upward through its motherboard and vendor
///
/// This is a materialized view over the catalog document; it owns copies of
/// the leaf data plus the derived vendor/motherboard pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceType {
    pub id: String,
    pub description: String,
    pub hardware_spec: HardwareSpec,
    pub boot_config: BootConfig,
    pub bios_template: Option<String>,
    pub preserve_settings: Option<String>,

    /// Owning motherboard model
    pub motherboard: String,

    /// Owning vendor id
    pub vendor: String,

    /// Owning vendor display name
    pub vendor_display_name: String,
}

// =============================================================================
// Catalog
// =============================================================================

/// Immutable catalog snapshot
///
/// All query results are owned copies; concurrent readers share the snapshot
/// without locks. Reload replaces the whole snapshot through
/// [`crate::CatalogHandle`].
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    document: CatalogDocument,

    /// device_type_id → (vendor_id, motherboard model)
    index: BTreeMap<String, (String, String)>,

    /// BIOS template references that did not resolve at load time
    warnings: Vec<String>,
}

impl Catalog {
    /// Load a catalog from YAML text
    ///
    /// # Errors
    /// `ConfigInvalid` on duplicate device-type ids, empty vendor links or
    /// malformed structure. Unresolved BIOS template references are recorded
    /// as warnings, not errors; they harden into errors when the template is
    /// required through [`Catalog::require_bios_template`].
    pub fn load(source: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_yml::from_str(source)?;
        Self::from_document(document)
    }

    /// Build a catalog from an already-parsed document
    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let mut index = BTreeMap::new();
        let mut warnings = Vec::new();

        for (vendor_id, vendor) in &document.vendors {
            if vendor.display_name.trim().is_empty() {
                return Err(CatalogError::invalid(format!(
                    "vendor '{vendor_id}' has an empty display name"
                )));
            }

            for (model, board) in &vendor.motherboards {
                for (type_id, entry) in &board.device_types {
                    if let Some((other_vendor, other_model)) = index.insert(
                        type_id.clone(),
                        (vendor_id.clone(), model.clone()),
                    ) {
                        return Err(CatalogError::invalid(format!(
                            "duplicate device type '{type_id}' under {vendor_id}/{model} and {other_vendor}/{other_model}"
                        )));
                    }

                    if let Some(template) = &entry.bios_template {
                        if !document.bios_templates.contains_key(template) {
                            warnings.push(format!(
                                "device type '{type_id}' references unknown bios template '{template}'"
                            ));
                        }
                    }
                    if let Some(preserve) = &entry.preserve_settings {
                        if !document.preserve_settings.contains_key(preserve) {
                            warnings.push(format!(
                                "device type '{type_id}' references unknown preserve list '{preserve}'"
                            ));
                        }
                    }
                }
            }
        }

        for warning in &warnings {
            tracing::warn!(%warning, "catalog loaded with unresolved reference");
        }

        Ok(Self {
            document,
            index,
            warnings,
        })
    }

    /// Serialize the catalog back to YAML
    ///
    /// `load(serialize(catalog))` reproduces an equal catalog for every
    /// catalog that loads without errors.
    pub fn serialize(&self) -> Result<String, CatalogError> {
        Ok(serde_yml::to_string(&self.document)?)
    }

    /// Warnings recorded at load time
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// All vendors, keyed by id
    #[must_use]
    pub fn vendors(&self) -> &BTreeMap<String, VendorEntry> {
        &self.document.vendors
    }

    // =========================================================================
    // Resolution Queries
    // =========================================================================

    /// All device types in stable order by id
    #[must_use]
    pub fn list_device_types(&self) -> Vec<DeviceType> {
        self.index
            .keys()
            .filter_map(|id| self.get_device_type(id).ok())
            .collect()
    }

    /// Resolve a device type by id
    ///
    /// # Errors
    /// `NotFound` when the id is not in the catalog.
    pub fn get_device_type(&self, id: &str) -> Result<DeviceType, CatalogError> {
        let (vendor_id, model) = self
            .index
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(format!("device type '{id}'")))?;

        let vendor = &self.document.vendors[vendor_id];
        let entry = &vendor.motherboards[model].device_types[id];

        Ok(Self::materialize(id, entry, vendor_id, vendor, model))
    }

    /// All device types belonging to one vendor
    #[must_use]
    pub fn by_vendor(&self, vendor_id: &str) -> Vec<DeviceType> {
        self.list_device_types()
            .into_iter()
            .filter(|dt| dt.vendor == vendor_id)
            .collect()
    }

    /// All device types on one motherboard
    #[must_use]
    pub fn by_motherboard(&self, vendor_id: &str, model: &str) -> Vec<DeviceType> {
        self.list_device_types()
            .into_iter()
            .filter(|dt| dt.vendor == vendor_id && dt.motherboard == model)
            .collect()
    }

    /// Case-insensitive substring search across descriptions and spec strings
    #[must_use]
    pub fn search(&self, needle: &str) -> Vec<DeviceType> {
        let needle = needle.to_lowercase();

        self.list_device_types()
            .into_iter()
            .filter(|dt| {
                let spec = &dt.hardware_spec;
                let haystacks = [
                    Some(dt.id.as_str()),
                    Some(dt.description.as_str()),
                    spec.cpu_model.as_deref(),
                    spec.storage.as_deref(),
                    spec.network.as_deref(),
                ];
                haystacks
                    .into_iter()
                    .flatten()
                    .any(|hay| hay.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Firmware procedures for a device type, per component
    ///
    /// Motherboard-specific tracking entries override vendor defaults
    /// component by component.
    ///
    /// # Errors
    /// `NotFound` when the device type is not in the catalog.
    pub fn get_firmware_methods(
        &self,
        device_type_id: &str,
    ) -> Result<BTreeMap<String, MethodDescriptor>, CatalogError> {
        let (vendor_id, model) = self
            .index
            .get(device_type_id)
            .ok_or_else(|| CatalogError::NotFound(format!("device type '{device_type_id}'")))?;

        let vendor = &self.document.vendors[vendor_id];
        let board = &vendor.motherboards[model];

        let mut methods = vendor.firmware_defaults.clone();
        for (component, tracking) in &board.firmware {
            methods.insert(
                component.clone(),
                MethodDescriptor {
                    method: tracking.method.clone(),
                    artifact: Some(tracking.artifact.clone()),
                    version: Some(tracking.latest_version.clone()),
                },
            );
        }

        Ok(methods)
    }

    /// Resolve a BIOS template by name
    ///
    /// This is the hardened form of the load-time warning: a template that a
    /// workflow actually requires must exist.
    ///
    /// # Errors
    /// `ConfigInvalid` when the template is unknown.
    pub fn require_bios_template(
        &self,
        name: &str,
    ) -> Result<&BTreeMap<String, serde_json::Value>, CatalogError> {
        self.document.bios_templates.get(name).ok_or_else(|| {
            CatalogError::invalid(format!("required bios template '{name}' is not defined"))
        })
    }

    /// Resolve a preserve list by name, empty when unknown
    #[must_use]
    pub fn preserve_list(&self, name: &str) -> Vec<String> {
        self.document
            .preserve_settings
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn materialize(
        id: &str,
        entry: &DeviceTypeEntry,
        vendor_id: &str,
        vendor: &VendorEntry,
        model: &str,
    ) -> DeviceType {
        DeviceType {
            id: id.to_string(),
            description: entry.description.clone(),
            hardware_spec: entry.hardware_spec.clone(),
            boot_config: entry.boot_config.clone(),
            bios_template: entry.bios_template.clone(),
            preserve_settings: entry.preserve_settings.clone(),
            motherboard: model.to_string(),
            vendor: vendor_id.to_string(),
            vendor_display_name: vendor.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
vendors:
  hpe:
    display_name: HPE
    firmware_defaults:
      bmc:
        method: redfish_multipart
      bios:
        method: redfish_multipart
    motherboards:
      ProLiant-DL380-Gen10:
        firmware:
          bios:
            latest_version: U30_2.90
            method: vendor_tool
            artifact: hpe/u30-290.fwpkg
        device_types:
          h2.m5.xlarge:
            description: HPE storage-dense node
            hardware_spec:
              cpu_model: Intel Xeon Gold 6230
              cpu_cores: 40
              memory_gib: 384
  supermicro:
    display_name: Supermicro
    aliases: ["Super Micro Computer"]
    motherboards:
      X11DPT-B:
        device_types:
          a1.c5.large:
            description: dual-socket compute node
            hardware_spec:
              cpu_model: Intel Xeon Gold 6230
              cpu_cores: 40
              memory_gib: 192
            bios_template: compute-defaults
            preserve_settings: network-safe
bios_templates:
  compute-defaults:
    BootMode: Uefi
    SriovEnable: Enabled
preserve_settings:
  network-safe: [NicBoot1, NicBoot2]
"#
    }

    #[test]
    fn test_load_and_list_ordering() {
        let catalog = Catalog::load(sample_yaml()).unwrap();
        let ids: Vec<_> = catalog
            .list_device_types()
            .into_iter()
            .map(|dt| dt.id)
            .collect();
        assert_eq!(ids, vec!["a1.c5.large", "h2.m5.xlarge"]);
    }

    #[test]
    fn test_device_type_resolves_upward() {
        let catalog = Catalog::load(sample_yaml()).unwrap();
        let dt = catalog.get_device_type("a1.c5.large").unwrap();

        assert_eq!(dt.vendor, "supermicro");
        assert_eq!(dt.motherboard, "X11DPT-B");
        assert_eq!(dt.vendor_display_name, "Supermicro");
    }

    #[test]
    fn test_get_unknown_device_type() {
        let catalog = Catalog::load(sample_yaml()).unwrap();
        assert!(matches!(
            catalog.get_device_type("zz.none"),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_device_type_fails_load() {
        let yaml = r#"
vendors:
  hpe:
    display_name: HPE
    motherboards:
      Board-A:
        device_types:
          dup.type:
            description: first
      Board-B:
        device_types:
          dup.type:
            description: second
"#;
        assert!(matches!(
            Catalog::load(yaml),
            Err(CatalogError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_unresolved_template_is_warning_until_required() {
        let yaml = r#"
vendors:
  hpe:
    display_name: HPE
    motherboards:
      Board-A:
        device_types:
          h1.small:
            description: small node
            bios_template: missing-template
"#;
        let catalog = Catalog::load(yaml).unwrap();
        assert_eq!(catalog.warnings().len(), 1);
        assert!(matches!(
            catalog.require_bios_template("missing-template"),
            Err(CatalogError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_firmware_methods_motherboard_overrides_vendor() {
        let catalog = Catalog::load(sample_yaml()).unwrap();
        let methods = catalog.get_firmware_methods("h2.m5.xlarge").unwrap();

        // vendor default survives for bmc
        assert_eq!(methods["bmc"].method, "redfish_multipart");
        // motherboard tracking overrides bios
        assert_eq!(methods["bios"].method, "vendor_tool");
        assert_eq!(methods["bios"].version.as_deref(), Some("U30_2.90"));
    }

    #[test]
    fn test_by_vendor_and_by_motherboard() {
        let catalog = Catalog::load(sample_yaml()).unwrap();

        let hpe = catalog.by_vendor("hpe");
        assert_eq!(hpe.len(), 1);
        assert_eq!(hpe[0].id, "h2.m5.xlarge");

        let board = catalog.by_motherboard("supermicro", "X11DPT-B");
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].id, "a1.c5.large");

        assert!(catalog.by_motherboard("supermicro", "unknown").is_empty());
        assert!(catalog.by_vendor("dell").is_empty());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let catalog = Catalog::load(sample_yaml()).unwrap();

        let hits = catalog.search("XEON GOLD");
        assert_eq!(hits.len(), 2);

        let hits = catalog.search("storage-dense");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "h2.m5.xlarge");
    }

    #[test]
    fn test_serialize_round_trip() {
        let catalog = Catalog::load(sample_yaml()).unwrap();
        let serialized = catalog.serialize().unwrap();
        let reloaded = Catalog::load(&serialized).unwrap();
        assert_eq!(reloaded, catalog);
    }

    #[test]
    fn test_preserve_list_lookup() {
        let catalog = Catalog::load(sample_yaml()).unwrap();
        assert_eq!(
            catalog.preserve_list("network-safe"),
            vec!["NicBoot1", "NicBoot2"]
        );
        assert!(catalog.preserve_list("unknown").is_empty());
    }
}
