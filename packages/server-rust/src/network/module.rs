//! Network module with deferred startup.
//!
//! `new()` allocates the scope hub and shutdown controller, `start()` binds
//! the listener, `serve()` runs until the shutdown future resolves. The hub
//! exists before the listener so the lifecycle manager can publish through
//! it from the moment it is built.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::connection::{OutboundMessage, ScopeHub};
use super::handlers::{
    cache_clear_handler, cache_stats_handler, health_handler, liveness_handler,
    operation_handler, readiness_handler, scope_operations_handler, ws_upgrade_handler, AppState,
};
use super::middleware::{track_in_flight, with_http_layers};
use super::shutdown::ShutdownController;
use crate::orchestrator::Orchestrator;

/// Errors from the serving lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("start() must be called before serve()")]
    NotStarted,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Owns the HTTP/WebSocket server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    hub: Arc<ScopeHub>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            hub: Arc::new(ScopeHub::new()),
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared scope hub; hand it to the lifecycle manager as its publisher.
    #[must_use]
    pub fn hub(&self) -> Arc<ScopeHub> {
        Arc::clone(&self.hub)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router:
    ///
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - `GET /ws/{scope}` WebSocket subscription
    /// - `GET /scopes/{scope}/operations`
    /// - `GET /operations/{id}`
    /// - `GET /cache`, `DELETE /cache`
    pub fn build_router(&self, orchestrator: Arc<Orchestrator>) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            lifecycle: Arc::clone(orchestrator.lifecycle()),
            orchestrator,
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/ws/{scope}", get(ws_upgrade_handler))
            .route("/scopes/{scope}/operations", get(scope_operations_handler))
            .route("/operations/{id}", get(operation_handler))
            .route("/cache", get(cache_stats_handler).delete(cache_clear_handler))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.shutdown),
                track_in_flight,
            ))
            .with_state(state);

        with_http_layers(router, &self.config)
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Bind` if the address cannot be bound.
    pub async fn start(&mut self) -> Result<u16, NetworkError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| NetworkError::Bind { addr, source })?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains subscribers.
    ///
    /// `orchestrator` must publish through [`hub`](Self::hub) for
    /// subscribers to see its operations.
    ///
    /// After the signal: state moves to `Draining`, every subscriber gets a
    /// close frame, in-flight work gets `drain_timeout` to finish, and the
    /// state moves to `Stopped` if it did.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::NotStarted` if `start()` was not called, or an
    /// I/O error if the server fails.
    pub async fn serve(
        mut self,
        orchestrator: Arc<Orchestrator>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), NetworkError> {
        let listener = self.listener.take().ok_or(NetworkError::NotStarted)?;
        let router = self.build_router(orchestrator);

        self.shutdown.set_ready();
        info!("serving HTTP and WebSocket connections");

        let controller = Arc::clone(&self.shutdown);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // Flip state first so open sessions see the signal and close.
                controller.trigger_shutdown();
            })
            .await?;

        drain_subscribers(&self.hub, &self.shutdown, &self.config).await;
        Ok(())
    }
}

/// Sends a close frame to every subscriber and waits for in-flight work.
async fn drain_subscribers(hub: &ScopeHub, shutdown: &ShutdownController, config: &NetworkConfig) {
    shutdown.trigger_shutdown();

    let handles = hub.drain_all();
    if !handles.is_empty() {
        info!(count = handles.len(), "closing subscribers");
        for handle in &handles {
            let _ = handle.try_send(OutboundMessage::Close(Some(
                "server shutting down".to_string(),
            )));
        }
    }

    if shutdown.wait_for_drain(config.drain_timeout).await {
        info!("all sessions drained");
    } else {
        warn!(
            in_flight = shutdown.in_flight_count(),
            "drain timeout expired with work still in flight"
        );
    }
}
