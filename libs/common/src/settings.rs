//! Orchestrator settings
//!
//! Layered configuration: built-in defaults, then an optional
//! `metalforge.toml`, then `METALFORGE_*` environment variables.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// MaaS endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct MaasSettings {
    pub endpoint: String,
    pub credentials_ref: String,
}

/// Top-level orchestrator settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path of the SQLite history database
    pub database_path: String,

    /// Path of the device catalog YAML document
    pub catalog_path: String,

    /// Name of the default credentials entry steps resolve at runtime
    pub credentials_ref: String,

    /// MaaS endpoint, when a real controller is attached
    #[serde(default)]
    pub maas: Option<MaasSettings>,

    /// Per-step timeout overrides in seconds (step name → seconds)
    #[serde(default)]
    pub step_timeouts: HashMap<String, u64>,

    /// Grace period for shutdown, in seconds
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// How long terminal workflows stay in memory, in hours
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Slack added on top of the summed step timeouts (0.10 = 10%)
    #[serde(default = "default_aggregate_slack")]
    pub aggregate_slack: f64,
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_retention_hours() -> u64 {
    24
}

fn default_aggregate_slack() -> f64 {
    0.10
}

impl Settings {
    /// Load settings from defaults, `metalforge.toml` and the environment
    pub fn load() -> Result<Self, SettingsError> {
        let settings = config::Config::builder()
            .set_default("database_path", "metalforge.db")?
            .set_default("catalog_path", "catalog.yaml")?
            .set_default("credentials_ref", "default")?
            .add_source(config::File::with_name("metalforge").required(false))
            .add_source(config::Environment::with_prefix("METALFORGE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.shutdown_grace_secs, 30);
        assert_eq!(settings.retention_hours, 24);
        assert!((settings.aggregate_slack - 0.10).abs() < f64::EPSILON);
    }
}
