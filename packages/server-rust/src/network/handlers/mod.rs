//! HTTP and WebSocket handlers plus the state they share.

pub mod cache;
pub mod health;
pub mod operations;
pub mod websocket;

pub use cache::{cache_clear_handler, cache_stats_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use operations::{operation_handler, scope_operations_handler};
pub use websocket::ws_upgrade_handler;

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ScopeHub, ShutdownController};
use crate::lifecycle::LifecycleManager;
use crate::orchestrator::Orchestrator;

/// Shared application state passed to all axum handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    /// Subscribers that receive progress notifications.
    pub hub: Arc<ScopeHub>,
    pub lifecycle: Arc<LifecycleManager>,
    /// Owner of the response cache; shares `lifecycle`.
    pub orchestrator: Arc<Orchestrator>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
