//! Shared domain types for the Metalforge orchestrator
//!
//! This crate is the vocabulary every other crate speaks: workflow and step
//! lifecycle enums, the error-kind taxonomy, hardware facts, classification
//! results, progress events, configuration plans, and the wire-level status
//! snapshots consumed by operator tooling.

pub mod classification;
pub mod enums;
pub mod error;
pub mod events;
pub mod facts;
pub mod history;
pub mod plan;
pub mod snapshot;

pub use classification::{Classification, MatchCriterion};
pub use enums::{Confidence, ProgressKind, ReclassifyPolicy, StepStatus, WorkflowStatus};
pub use error::{ErrorClass, ErrorKind, StepError, StepOutcome, WorkflowError};
pub use events::ProgressEvent;
pub use facts::HardwareFacts;
pub use history::{HistoryFilter, HistoryRecord};
pub use plan::{ConfigPlan, FirmwareUpdate, PlanStrategy};
pub use snapshot::{StepSnapshot, WorkflowSnapshot};
