//! MaaS controller contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Lifecycle status of a MaaS machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    New,
    Commissioning,
    /// Enlisted, inventoried and ready for deployment
    Ready,
    Deployed,
    Failed,
}

/// A machine as reported by MaaS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub system_id: String,
    pub hostname: String,
    pub status: MachineStatus,
    pub ip_addresses: Vec<String>,
    pub tags: Vec<String>,
}

/// Metal-as-a-Service controller operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MaasClient: Send + Sync {
    /// All machines known to the controller
    async fn list_machines(&self) -> Result<Vec<Machine>, AdapterError>;

    /// Start commissioning a machine and return its current state
    async fn commission(&self, system_id: &str) -> Result<Machine, AdapterError>;

    /// Fetch one machine
    async fn get(&self, system_id: &str) -> Result<Machine, AdapterError>;

    /// Release a machine back to the pool
    async fn release(&self, system_id: &str) -> Result<(), AdapterError>;

    /// Apply tags to a machine
    async fn tag(&self, system_id: &str, tags: &[String]) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_scripting() {
        let mut mock = MockMaasClient::new();
        mock.expect_get().times(1).returning(|system_id| {
            Ok(Machine {
                system_id: system_id.to_string(),
                hostname: format!("node-{system_id}"),
                status: MachineStatus::Ready,
                ip_addresses: vec!["10.20.0.7".to_string()],
                tags: vec![],
            })
        });
        mock.expect_release()
            .times(1)
            .returning(|_| Err(AdapterError::transient_network("controller flapping")));

        let machine = mock.get("srv-001").await.unwrap();
        assert_eq!(machine.status, MachineStatus::Ready);
        assert!(mock.release("srv-001").await.is_err());
    }
}
