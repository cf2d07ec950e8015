//! Vendor tool contract
//!
//! Wraps vendor-specific utilities (sumtool, hponcfg, racadm). Installing
//! the utility on demand is internal to the implementation and must be
//! idempotent; callers never see an install step.

use async_trait::async_trait;

use crate::error::AdapterError;

/// Vendor-specific BIOS and firmware tooling
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VendorTool: Send + Sync {
    /// Identify the vendor of the target host
    ///
    /// Returns the lowercase vendor id. `NotFound` means the tool does not
    /// apply to this hardware; callers treat that as a skip, not a failure.
    async fn probe(&self, target: &str) -> Result<String, AdapterError>;

    /// Read the current BIOS configuration as an opaque blob
    async fn pull_bios(&self, target: &str) -> Result<String, AdapterError>;

    /// Apply a BIOS configuration blob
    async fn push_bios(&self, target: &str, blob: &str) -> Result<(), AdapterError>;

    /// Apply a firmware artifact to one component
    async fn firmware_update(
        &self,
        target: &str,
        component: &str,
        artifact: &str,
    ) -> Result<(), AdapterError>;
}
