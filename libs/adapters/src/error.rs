//! Adapter error type

use thiserror::Error;

use metalforge_domain::{ErrorKind, StepError};

/// Error returned by any capability adapter operation
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct AdapterError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl AdapterError {
    /// Create an adapter error
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Network-level transient failure
    #[must_use]
    pub fn transient_network(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, detail)
    }

    /// SSH transient failure
    #[must_use]
    pub fn ssh_transient(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SshTransient, detail)
    }

    /// Target not known to the external system
    #[must_use]
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    /// Authentication failure
    #[must_use]
    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, detail)
    }
}

impl From<AdapterError> for StepError {
    fn from(err: AdapterError) -> Self {
        Self::new(err.kind, err.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_preserves_kind() {
        let err: StepError = AdapterError::ssh_transient("connection reset").into();
        assert_eq!(err.kind, ErrorKind::SshTransient);
        assert_eq!(err.detail, "connection reset");
    }
}
