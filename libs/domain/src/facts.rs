//! Raw hardware facts gathered during discovery

use serde::{Deserialize, Serialize};

/// Hardware facts as discovered on a live host
///
/// All fields are optional: discovery degrades gracefully when individual
/// probes fail, and the classifier scores whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareFacts {
    /// System manufacturer string (e.g. "Supermicro")
    #[serde(default)]
    pub manufacturer: Option<String>,

    /// Product or board name (e.g. "X11DPT-B")
    #[serde(default)]
    pub product_name: Option<String>,

    /// CPU model string (e.g. "Intel(R) Xeon(R) Gold 6258R")
    #[serde(default)]
    pub cpu_model: Option<String>,

    /// Physical core count across all sockets
    #[serde(default)]
    pub cpu_cores: Option<u32>,

    /// Total memory in GiB
    #[serde(default)]
    pub memory_total_gib: Option<u32>,
}

impl HardwareFacts {
    /// Whether any discovery probe produced a value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manufacturer.is_none()
            && self.product_name.is_none()
            && self.cpu_model.is_none()
            && self.cpu_cores.is_none()
            && self.memory_total_gib.is_none()
    }
}
