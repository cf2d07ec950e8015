//! Step contract and per-step execution policy

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use metalforge_domain::{StepError, StepOutcome};

use crate::context::Context;
use crate::retry::RetryPolicy;

/// Default wall-clock timeout for a step
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);

/// A named, side-effecting unit of work
///
/// Implementations must be re-entrant across their own attempts: retrying a
/// partially-applied step is permitted and must converge.
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step against the workflow context
    async fn run(&self, ctx: &mut Context) -> Result<StepOutcome, StepError>;
}

/// A step plus its execution policy, as composed into a template
#[derive(Clone)]
pub struct StepSpec {
    /// Step name, unique within a template
    pub name: String,

    /// Human description shown in status snapshots
    pub description: String,

    /// Wall-clock timeout per attempt
    pub timeout: Duration,

    /// Retry budget beyond the first attempt
    pub retries: u32,

    /// Backoff policy between attempts
    pub retry_policy: RetryPolicy,

    /// The work itself
    pub action: Arc<dyn Step>,
}

impl StepSpec {
    /// Create a spec with default timeout, no retries, default backoff
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        action: Arc<dyn Step>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            timeout: DEFAULT_STEP_TIMEOUT,
            retries: 0,
            retry_policy: RetryPolicy::default(),
            action,
        }
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the backoff policy
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
