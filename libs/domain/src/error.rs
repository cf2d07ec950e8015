//! Error taxonomy shared across steps, adapters and the engine
//!
//! Steps and adapters raise typed errors; the engine classifies them through
//! [`ErrorKind::class`]. Nothing downstream matches on error strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// The closed set of error kinds the orchestrator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or inconsistent configuration; fatal at load time
    ConfigInvalid,
    /// Lookup miss; ordinary at query time, fatal when a step requires it
    NotFound,
    /// Generic transient failure
    Transient,
    /// Network-level transient failure
    TransientNetwork,
    /// SSH session or command transient failure
    SshTransient,
    /// MaaS controller is busy or rate-limiting
    MaasBusy,
    /// Vendor tool is busy (another invocation holds its lock)
    VendorToolBusy,
    /// Target BMC or host is unreachable
    Unreachable,
    /// Required command missing on the target, after an install attempt
    CommandMissing,
    /// Authentication or authorization failure; never retried
    Auth,
    /// Firmware image or payload failed verification
    IntegrityFailure,
    /// Applied configuration conflicts with device state
    ConfigConflict,
    /// Wall-clock deadline exceeded
    Timeout,
    /// Cooperative cancellation observed
    Cancelled,
    /// Workflow did not unwind within the shutdown grace period
    ShutdownTimeout,
    /// Workflow was in flight when the orchestrator last stopped
    OrchestratorRestart,
    /// Invariant violation inside the orchestrator; indicates a bug
    Internal,
}

/// How the engine reacts to an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry under the step's backoff policy
    Retryable,
    /// Fail the step and the workflow
    Fatal,
    /// Terminate the workflow as cancelled
    Cancel,
}

impl ErrorKind {
    /// Classification table used by the engine
    ///
    /// `Timeout` is nominally retryable but the engine caps it at a single
    /// retry per step regardless of the step's retry budget.
    #[must_use]
    pub fn class(self) -> ErrorClass {
        match self {
            Self::Transient
            | Self::TransientNetwork
            | Self::SshTransient
            | Self::MaasBusy
            | Self::VendorToolBusy
            | Self::Unreachable
            | Self::CommandMissing
            | Self::Timeout => ErrorClass::Retryable,
            Self::ConfigInvalid
            | Self::NotFound
            | Self::Auth
            | Self::IntegrityFailure
            | Self::ConfigConflict
            | Self::ShutdownTimeout
            | Self::OrchestratorRestart
            | Self::Internal => ErrorClass::Fatal,
            Self::Cancelled => ErrorClass::Cancel,
        }
    }

    /// Get the kind name as serialized on the wire and in history rows
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "config_invalid",
            Self::NotFound => "not_found",
            Self::Transient => "transient",
            Self::TransientNetwork => "transient_network",
            Self::SshTransient => "ssh_transient",
            Self::MaasBusy => "maas_busy",
            Self::VendorToolBusy => "vendor_tool_busy",
            Self::Unreachable => "unreachable",
            Self::CommandMissing => "command_missing",
            Self::Auth => "auth",
            Self::IntegrityFailure => "integrity_failure",
            Self::ConfigConflict => "config_conflict",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ShutdownTimeout => "shutdown_timeout",
            Self::OrchestratorRestart => "orchestrator_restart",
            Self::Internal => "internal",
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config_invalid" => Ok(Self::ConfigInvalid),
            "not_found" => Ok(Self::NotFound),
            "transient" => Ok(Self::Transient),
            "transient_network" => Ok(Self::TransientNetwork),
            "ssh_transient" => Ok(Self::SshTransient),
            "maas_busy" => Ok(Self::MaasBusy),
            "vendor_tool_busy" => Ok(Self::VendorToolBusy),
            "unreachable" => Ok(Self::Unreachable),
            "command_missing" => Ok(Self::CommandMissing),
            "auth" => Ok(Self::Auth),
            "integrity_failure" => Ok(Self::IntegrityFailure),
            "config_conflict" => Ok(Self::ConfigConflict),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "shutdown_timeout" => Ok(Self::ShutdownTimeout),
            "orchestrator_restart" => Ok(Self::OrchestratorRestart),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Step Error
// =============================================================================

/// Typed error raised at the step boundary
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct StepError {
    /// Error kind, classified by the engine
    pub kind: ErrorKind,

    /// Short human-readable detail
    pub detail: String,
}

impl StepError {
    /// Create a step error
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, detail)
    }

    /// Create an internal error (orchestrator bug, e.g. a missing context key)
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}

// =============================================================================
// Step Outcome
// =============================================================================

/// Successful completion modes of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step performed its work
    Done,
    /// Step determined it does not apply and was skipped
    Skipped(String),
}

impl StepOutcome {
    /// Create a skipped outcome
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

// =============================================================================
// Workflow Error
// =============================================================================

/// First fatal error captured by a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<StepError> for WorkflowError {
    fn from(err: StepError) -> Self {
        Self {
            kind: err.kind,
            detail: err.detail,
        }
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}
