//! Unified device catalog and classification engine
//!
//! The catalog is a three-level tree (vendor → motherboard → device type)
//! loaded once from a YAML document and immutable thereafter. Reload swaps
//! the whole snapshot atomically through [`CatalogHandle`]; in-flight
//! workflows keep the snapshot they captured at start.

pub mod catalog;
pub mod classify;
pub mod document;
pub mod error;
pub mod handle;

pub use catalog::{Catalog, DeviceType};
pub use classify::classify;
pub use document::{
    BootConfig, CatalogDocument, DeviceTypeEntry, FirmwareTracking, HardwareSpec,
    MethodDescriptor, MotherboardEntry, VendorEntry,
};
pub use error::CatalogError;
pub use handle::CatalogHandle;
