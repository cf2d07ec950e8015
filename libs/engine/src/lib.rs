//! Workflow orchestration engine
//!
//! Runs provisioning workflows as ordered step lists under a shared context:
//! parallel workflows, strictly sequential steps, cooperative cancellation,
//! per-step timeouts and retry policy, sub-task progress fan-out, and
//! durable history recording.

pub mod bus;
pub mod cancel;
pub mod context;
pub mod engine;
pub mod factory;
pub mod manager;
pub mod retry;
pub mod state;
pub mod step;
pub mod steps;

pub use bus::{ProgressBus, ProgressSubscriber};
pub use cancel::{cancel_pair, CancelObserver, CancelSignal};
pub use context::{keys, Context};
pub use engine::{Engine, EngineConfig};
pub use factory::{FactoryError, WorkflowFactory};
pub use manager::{
    CreateWorkflowError, CreateWorkflowRequest, ManagerConfig, WorkflowManager,
};
pub use retry::RetryPolicy;
pub use state::WorkflowState;
pub use step::{Step, StepSpec, DEFAULT_STEP_TIMEOUT};
