use crate::{
    config::HttpConfig,
    error::{HealthError, Result},
    host::Subcomponent,
    status::Aggregator,
};
use async_trait::async_trait;
use axum::{routing::get, Router};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::handlers::{config_handler, status_handler, watch_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) aggregator: Aggregator,
    pub(crate) failure_duration: Duration,
    /// Last configuration delivered by the host, if any
    pub(crate) host_config: Arc<RwLock<Option<serde_json::Value>>>,
}

impl ServerState {
    pub fn new(aggregator: Aggregator, failure_duration: Duration) -> Self {
        Self {
            aggregator,
            failure_duration,
            host_config: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build the health routes for the configured paths
pub fn router(config: &HttpConfig, state: ServerState) -> Router {
    let mut router = Router::new()
        .route(&config.status_path, get(status_handler))
        .route(&config.watch_path, get(watch_handler));

    if config.config_enabled {
        router = router.route(&config.config_path, get(config_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// HTTP health server exposing point-in-time status and verdict streams
pub struct HttpServer {
    pub(crate) config: HttpConfig,
    pub(crate) state: ServerState,
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServer {
    /// Create a new health server
    pub fn new(config: HttpConfig, aggregator: Aggregator, failure_duration: Duration) -> Self {
        Self {
            config,
            state: ServerState::new(aggregator, failure_duration),
            cancellation_token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Subcomponent for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self) -> Result<()> {
        let addr = self.config.endpoint();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| HealthError::server(format!("Failed to bind {}: {}", addr, e)))?;

        info!("Health server listening on {}", addr);

        let app = router(&self.config, self.state.clone());
        let token = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!("Health server error: {}", e);
            }
            info!("Health server on {} stopped", addr);
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancellation_token.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| HealthError::server(format!("Server task failed: {}", e)))?;
        }
        Ok(())
    }

    fn notify_config(&self, config: &serde_json::Value) -> Result<()> {
        *self.state.host_config.write() = Some(config.clone());
        Ok(())
    }
}

/// Health server builder for configuration
pub struct HttpServerBuilder {
    config: Option<HttpConfig>,
    aggregator: Option<Aggregator>,
    failure_duration: Option<Duration>,
}

impl HttpServerBuilder {
    /// Create a new health server builder
    pub fn new() -> Self {
        Self {
            config: None,
            aggregator: None,
            failure_duration: None,
        }
    }

    /// Set the HTTP configuration
    pub fn config(mut self, config: HttpConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the aggregator to serve
    pub fn aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Set the recoverable-error grace duration
    pub fn failure_duration(mut self, duration: Duration) -> Self {
        self.failure_duration = Some(duration);
        self
    }

    /// Build the health server
    pub fn build(self) -> Result<HttpServer> {
        let config = self
            .config
            .ok_or_else(|| HealthError::server("HTTP configuration is required"))?;

        let aggregator = self
            .aggregator
            .ok_or_else(|| HealthError::server("Aggregator is required"))?;

        let failure_duration = self
            .failure_duration
            .ok_or_else(|| HealthError::server("Failure duration is required"))?;

        Ok(HttpServer::new(config, aggregator, failure_duration))
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
