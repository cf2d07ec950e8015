//! Metalforge orchestrator daemon
//!
//! Loads settings, recovers interrupted history rows, loads the device
//! catalog, and serves the workflow manager until ctrl-c.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use metalforge_adapters::stub::StubAdapters;
use metalforge_catalog::CatalogHandle;
use metalforge_common::{init_tracing, Settings};
use metalforge_db::{HistoryStore, SqliteHistoryStore};
use metalforge_engine::{EngineConfig, ManagerConfig, WorkflowFactory, WorkflowManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load().context("loading settings")?;
    tracing::info!(
        database = %settings.database_path,
        catalog = %settings.catalog_path,
        "starting metalforge orchestrator",
    );

    // History store plus the startup recovery scan: rows left RUNNING by a
    // previous process are finalized before any new workflow starts.
    let pool = metalforge_db::connect(&settings.database_path)
        .await
        .context("opening history database")?;
    let history = SqliteHistoryStore::new(pool);
    history.init_schema().await.context("creating schema")?;
    let recovered = history
        .recover_interrupted()
        .await
        .context("startup recovery scan")?;
    if recovered > 0 {
        tracing::warn!(recovered, "finalized workflows interrupted by restart");
    }

    let catalog =
        CatalogHandle::from_path(&settings.catalog_path).context("loading device catalog")?;
    for warning in catalog.snapshot().warnings() {
        tracing::warn!(%warning, "catalog warning");
    }

    // Real transport adapters are deployment-specific; the stub set serves
    // until they are wired in, and is what dry runs use.
    let adapters = StubAdapters::new().registry();

    let step_timeouts: HashMap<String, Duration> = settings
        .step_timeouts
        .iter()
        .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
        .collect();

    let config = ManagerConfig {
        shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
        retention: Duration::from_secs(settings.retention_hours * 60 * 60),
        engine: EngineConfig {
            aggregate_slack: settings.aggregate_slack,
            ..EngineConfig::default()
        },
        ..ManagerConfig::default()
    };

    let manager = Arc::new(WorkflowManager::new(
        catalog,
        adapters,
        Arc::new(history) as Arc<dyn HistoryStore>,
        WorkflowFactory::new().with_step_timeouts(step_timeouts),
        config,
        settings.credentials_ref.clone(),
    ));

    let cleanup = manager.spawn_cleanup();

    tracing::info!("orchestrator ready; waiting for control connections");
    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")?;

    tracing::info!("shutting down");
    cleanup.abort();
    manager.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}
