use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use toolwire_core::config::{EngineConfig, RunStoreBackend};
use toolwire_core::{Dispatcher, MemoryRunStore, PlanExecutor, RunStore, SqliteRunStore, ToolRegistry};
use toolwire_gateway::{app, spawn_run_purger, AppState};
use toolwire_tools::{register_all, TaskBoard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging Setup
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_env("TOOLWIRE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Toolwire Gateway Initializing...");
    let config = EngineConfig::from_env()?;

    // 2. Build The Registry
    // This is the one process-wide instance; everything below gets it handed in.
    info!("Registering tools (duplicate policy: {:?})...", config.duplicate_policy);
    let registry = Arc::new(ToolRegistry::new(config.duplicate_policy));
    let report = register_all(&registry, TaskBoard::new());
    for (name, err) in &report.rejected {
        error!("Tool '{}' was not registered: {}", name, err);
    }
    info!("Loaded {} tools.", registry.len());

    // 3. Open The Run Store
    let store: Arc<dyn RunStore> = match &config.run_store {
        RunStoreBackend::Memory => {
            info!("Paused plans are kept in memory");
            Arc::new(MemoryRunStore::with_ttl(config.run_ttl))
        }
        RunStoreBackend::Sqlite(url) => Arc::new(
            SqliteRunStore::connect(url, Some(config.run_ttl))
                .await
                .with_context(|| format!("failed to open run store at {}", url))?,
        ),
    };
    spawn_run_purger(Arc::clone(&store), config.purge_interval);

    // 4. Bundle State
    let dispatcher = Dispatcher::new(registry, PlanExecutor::new(store));
    let app = app(AppState::new(dispatcher));

    // 5. Start Server
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("Gateway listening on {}...", config.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
