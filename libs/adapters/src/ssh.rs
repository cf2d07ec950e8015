//! SSH session contract

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterError;

/// Output of a remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    /// Successful output with the given stdout
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Whether the command exited zero
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An established SSH session
#[async_trait]
pub trait SshSession: Send + Sync {
    /// Run a command under a wall-clock timeout
    async fn exec(&self, cmd: &str, timeout: Duration) -> Result<ExecOutput, AdapterError>;

    /// Close the session; closing twice is a no-op
    async fn close(&self);
}

/// SSH connection factory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SshClient: Send + Sync {
    /// Open a session to `host` as `user`, authenticating with the named key
    async fn connect(
        &self,
        host: &str,
        user: &str,
        key_ref: &str,
    ) -> Result<Box<dyn SshSession>, AdapterError>;
}
