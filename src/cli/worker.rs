use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::WorkerConfig;
use crate::core::activity::Activities;
use crate::core::container::DockerCli;
use crate::core::lifecycle::{EngineComponent, LifecycleManager};
use crate::core::service::SiloService;
use crate::core::store::SiloStore;
use crate::core::terminal::{GuideSection, print_info};
use crate::core::workflow::{Registry, WorkflowEngine};
use crate::interfaces::web::ApiServer;

/// Open the store, reach the container runtime and connect the workflow
/// engine described by `config`.
pub(crate) async fn build_service(config: &WorkerConfig) -> Result<SiloService> {
    let store = SiloStore::open(config.store_path())
        .await
        .with_context(|| format!("Failed to open store at {}", config.store_path().display()))?;
    let runtime = DockerCli::connect(config.container.clone())
        .await
        .context("Container runtime is not available")?;
    let activities = Activities::new(Arc::new(runtime), store.clone(), config.pipeline.capacity);
    let engine = WorkflowEngine::connect(
        &config.engine_endpoint(),
        &config.engine.task_queue,
        Registry::standard(),
        activities,
        config.activity_options(),
    )
    .await
    .context("Failed to connect the workflow engine")?;
    Ok(SiloService::new(store, engine))
}

/// Run the worker until Ctrl+C: HTTP control port plus the embedded engine.
pub async fn run_worker(config: WorkerConfig, log_tx: tokio::sync::broadcast::Sender<String>) -> Result<()> {
    info!("Starting silo-runner worker v{}", env!("CARGO_PKG_VERSION"));
    let service = build_service(&config).await?;

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(EngineComponent::new(
        service.engine().clone(),
    ))));
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        service,
        log_tx,
        config.server.host.clone(),
        config.server.port,
    ))));
    lifecycle.start().await?;

    GuideSection::new("Worker")
        .status(
            "Control port",
            &format!("http://{}:{}", config.server.host, config.server.port),
        )
        .status("Workflow engine", &config.engine_endpoint())
        .status("Task queue", &config.engine.task_queue)
        .blank()
        .status("Data directory", &config.data_dir.display().to_string())
        .print();
    println!();
    print_info("Press Ctrl+C to stop the worker.");

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}
