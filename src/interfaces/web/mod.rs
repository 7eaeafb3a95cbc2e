mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::lifecycle::LifecycleComponent;
use crate::core::service::SiloService;

/// HTTP control port of the worker.
pub struct ApiServer {
    service: SiloService,
    log_tx: tokio::sync::broadcast::Sender<String>,
    host: String,
    port: u16,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: SiloService,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
}

impl ApiServer {
    pub fn new(
        service: SiloService,
        log_tx: tokio::sync::broadcast::Sender<String>,
        host: String,
        port: u16,
    ) -> Self {
        Self {
            service,
            log_tx,
            host,
            port,
            shutdown: CancellationToken::new(),
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;
        let app = router::build_api_router(AppState {
            service: self.service.clone(),
            log_tx: self.log_tx.clone(),
        });
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            info!("API Server running at http://{addr}");
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        Ok(())
    }
}
