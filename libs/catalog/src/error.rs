//! Catalog errors

use thiserror::Error;

/// Errors raised by catalog loading and lookups
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Structural problem in the catalog document; fatal at load time
    #[error("invalid catalog: {0}")]
    ConfigInvalid(String),

    /// Lookup miss; ordinary at query time
    #[error("not found in catalog: {0}")]
    NotFound(String),

    /// YAML parse failure
    #[error("catalog parse error: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// Source could not be read
    #[error("catalog source error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Create a `ConfigInvalid` error
    #[must_use]
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::ConfigInvalid(detail.into())
    }
}
