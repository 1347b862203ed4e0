//! opwatch server: response cache, optimization rules, operation lifecycle
//! tracking and the WebSocket transport that carries progress to subscribers.

pub mod cache;
pub mod lifecycle;
pub mod network;
pub mod optimize;
pub mod orchestrator;
pub mod service;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheConfig, CacheKey, CacheSweeper, CacheTask, TtlCache};
pub use lifecycle::{LifecycleConfig, LifecycleError, LifecycleManager};
pub use network::{NetworkConfig, NetworkModule, ScopeHub};
pub use optimize::{ExecutionContext, OptimizationTag, OptimizerLimits, StrategySelector};
pub use orchestrator::{
    ExecuteError, ExecuteOutcome, ExecuteRequest, Orchestrator, OrchestratorConfig,
    PerformanceMetrics, ProgressReporter,
};
pub use service::{BackgroundWorker, ServerConfig};
pub use traits::{NullPublisher, ProgressPublisher, PublishError};
