//! Shared catalog handle with atomic snapshot swap

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::catalog::Catalog;
use crate::error::CatalogError;

/// Shared handle to the current catalog snapshot
///
/// Readers take a cheap `Arc` clone and keep it for as long as they need a
/// consistent view; reload swaps the pointer without disturbing them.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    /// Wrap an already-loaded catalog
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Load the catalog from a file path
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::new(Catalog::load(&source)?))
    }

    /// Current snapshot
    ///
    /// # Panics
    /// Panics if the lock is poisoned, which cannot happen: no writer panics
    /// while holding it.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.read().expect("catalog lock poisoned"))
    }

    /// Replace the snapshot atomically
    ///
    /// In-flight workflows keep whatever snapshot they captured at start.
    pub fn reload(&self, catalog: Catalog) {
        *self.inner.write().expect("catalog lock poisoned") = Arc::new(catalog);
    }

    /// Reload from a file path
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let source = std::fs::read_to_string(path)?;
        self.reload(Catalog::load(&source)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_VENDOR: &str = r#"
vendors:
  hpe:
    display_name: HPE
    motherboards:
      Board-A:
        device_types:
          h1.small:
            description: small node
"#;

    const TWO_VENDORS: &str = r#"
vendors:
  hpe:
    display_name: HPE
    motherboards:
      Board-A:
        device_types:
          h1.small:
            description: small node
  supermicro:
    display_name: Supermicro
    motherboards:
      X11DPT-B:
        device_types:
          a1.c5.large:
            description: compute node
"#;

    #[test]
    fn test_reload_swaps_snapshot_but_not_held_views() {
        let handle = CatalogHandle::new(Catalog::load(ONE_VENDOR).unwrap());

        let held = handle.snapshot();
        assert_eq!(held.list_device_types().len(), 1);

        handle.reload(Catalog::load(TWO_VENDORS).unwrap());

        // The held snapshot is unchanged; fresh snapshots see the new data.
        assert_eq!(held.list_device_types().len(), 1);
        assert_eq!(handle.snapshot().list_device_types().len(), 2);
    }
}
