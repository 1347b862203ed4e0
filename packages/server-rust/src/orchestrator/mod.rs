//! Composes cache, strategy selector and lifecycle manager into one call.
//!
//! `execute` flow:
//!
//! 1. Derive the cache key; on a hit return immediately, tagged `caching`.
//! 2. On a miss, shape the payload with the [`StrategySelector`].
//! 3. For trackable kinds, `start` an operation and hand the work a
//!    [`ProgressReporter`]; `complete` or `fail` it on the way out.
//! 4. Cache successful results of cacheable categories for the default TTL.

pub mod reporter;
pub mod request;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use opwatch_core::OperationKind;
use serde_json::{json, Value};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use reporter::ProgressReporter;
pub use request::{ExecuteError, ExecuteOutcome, ExecuteRequest, PerformanceMetrics};

use crate::cache::{CacheKey, TtlCache};
use crate::lifecycle::LifecycleManager;
use crate::optimize::{OptimizationTag, OptimizerLimits, StrategySelector};

/// Final message of a successfully tracked operation.
pub const COMPLETED_MESSAGE: &str = "Operation completed";
/// Failure message recorded when the execute future is dropped mid-flight.
pub const ABORTED_MESSAGE: &str = "Operation aborted before completion";

/// Tracking and caching policy for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// TTL for cached responses.
    pub default_ttl: Duration,
    /// Kinds that get a tracked operation with progress notifications.
    pub trackable_kinds: HashSet<OperationKind>,
    /// Kinds whose results are never cached (they have side effects).
    pub non_cacheable_kinds: HashSet<OperationKind>,
    /// Categories whose results are never cached.
    pub non_cacheable_categories: HashSet<String>,
    pub limits: OptimizerLimits,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn is_trackable(&self, kind: OperationKind) -> bool {
        self.trackable_kinds.contains(&kind)
    }

    #[must_use]
    pub fn is_cacheable(&self, category: &str, kind: OperationKind) -> bool {
        !self.non_cacheable_kinds.contains(&kind) && !self.non_cacheable_categories.contains(category)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            trackable_kinds: OperationKind::ALL
                .into_iter()
                .filter(|kind| *kind != OperationKind::Search)
                .collect(),
            non_cacheable_kinds: [
                OperationKind::FileBatch,
                OperationKind::Backup,
                OperationKind::BulkReorganization,
            ]
            .into_iter()
            .collect(),
            non_cacheable_categories: HashSet::new(),
            limits: OptimizerLimits::default(),
        }
    }
}

/// Runs caller-supplied work behind the response cache and lifecycle tracking.
pub struct Orchestrator {
    cache: Arc<TtlCache<Value>>,
    lifecycle: Arc<LifecycleManager>,
    selector: StrategySelector,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        cache: Arc<TtlCache<Value>>,
        lifecycle: Arc<LifecycleManager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            cache,
            lifecycle,
            selector: StrategySelector::new(config.limits.clone()),
            config,
        }
    }

    /// Replaces the strategy selector, e.g. one with extra rules registered.
    #[must_use]
    pub fn with_selector(mut self, selector: StrategySelector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Drops the cached response for `(category, kind, payload)`, if any.
    pub fn invalidate(&self, category: &str, kind: OperationKind, payload: &Value) -> bool {
        self.cache.invalidate(&response_key(category, kind, payload))
    }

    /// Serves `request` from cache or runs `work` on the optimized payload.
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::Work` with the work's own error (after the
    /// tracked operation has been failed), or `ExecuteError::Lifecycle` if a
    /// caller-supplied operation id is already active.
    pub async fn execute<F, Fut>(
        &self,
        request: ExecuteRequest,
        work: F,
    ) -> Result<ExecuteOutcome, ExecuteError>
    where
        F: FnOnce(Value, ProgressReporter) -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let span = info_span!(
            "execute",
            category = %request.category,
            kind = %request.kind,
            scope = %request.scope,
            cache_hit = tracing::field::Empty,
        );
        self.execute_inner(request, work).instrument(span).await
    }

    async fn execute_inner<F, Fut>(
        &self,
        request: ExecuteRequest,
        work: F,
    ) -> Result<ExecuteOutcome, ExecuteError>
    where
        F: FnOnce(Value, ProgressReporter) -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let started = Instant::now();
        let key = response_key(&request.category, request.kind, &request.payload);
        let cacheable = self.config.is_cacheable(&request.category, request.kind);

        if cacheable {
            if let Some(result) = self.cache.get(&key) {
                let metrics = PerformanceMetrics {
                    response_time: started.elapsed(),
                    cache_hit: true,
                    optimizations_applied: vec![OptimizationTag::Caching],
                };
                record_call(&metrics, "hit");
                return Ok(ExecuteOutcome {
                    result,
                    metrics,
                    operation_id: None,
                });
            }
        }

        let optimized = self
            .selector
            .apply(request.kind, &request.payload, &request.context);
        if !optimized.tags.is_empty() {
            debug!(tags = ?optimized.tags, "applied optimizations");
        }

        let mut guard = if self.config.is_trackable(request.kind) {
            let id = request
                .operation_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            self.lifecycle.start(
                id.clone(),
                request.kind,
                request.scope.clone(),
                request.total_steps,
                request.description_or_default(),
            )?;
            FailOnDrop::armed(self.lifecycle.clone(), id)
        } else {
            FailOnDrop::disarmed(self.lifecycle.clone())
        };
        let operation_id = guard.operation_id().map(str::to_string);
        let reporter = match &operation_id {
            Some(id) => ProgressReporter::tracked(self.lifecycle.clone(), id.clone()),
            None => ProgressReporter::untracked(),
        };

        match work(optimized.payload, reporter).await {
            Ok(result) => {
                if let Some(id) = guard.disarm() {
                    self.lifecycle
                        .complete(&id, COMPLETED_MESSAGE, Some(result.clone()));
                }
                if cacheable {
                    self.cache.put(key, result.clone(), self.config.default_ttl);
                }
                let metrics = PerformanceMetrics {
                    response_time: started.elapsed(),
                    cache_hit: false,
                    optimizations_applied: optimized.tags,
                };
                record_call(&metrics, "miss");
                Ok(ExecuteOutcome {
                    result,
                    metrics,
                    operation_id,
                })
            }
            Err(err) => {
                if let Some(id) = guard.disarm() {
                    self.lifecycle.fail(
                        &id,
                        err.to_string(),
                        Some(json!({ "error": format!("{err:#}") })),
                    );
                }
                metrics::counter!("opwatch_execute_failures_total", "kind" => request.kind.as_str())
                    .increment(1);
                Err(ExecuteError::Work(err))
            }
        }
    }
}

// Kind is part of the namespace: one category may front several kinds of work.
fn response_key(category: &str, kind: OperationKind, payload: &Value) -> CacheKey {
    CacheKey::derive(&format!("{category}:{kind}"), payload)
}

fn record_call(metrics: &PerformanceMetrics, cache: &'static str) {
    tracing::Span::current().record("cache_hit", metrics.cache_hit);
    metrics::histogram!("opwatch_execute_seconds", "cache" => cache)
        .record(metrics.response_time.as_secs_f64());
    debug!(
        response_secs = metrics.response_time.as_secs_f64(),
        tags = ?metrics.optimizations_applied,
        "execute finished"
    );
}

/// Fails the tracked operation if dropped while still armed, so an
/// abandoned `execute` future never leaves an operation running.
struct FailOnDrop {
    lifecycle: Arc<LifecycleManager>,
    operation_id: Option<String>,
}

impl FailOnDrop {
    fn armed(lifecycle: Arc<LifecycleManager>, operation_id: String) -> Self {
        Self {
            lifecycle,
            operation_id: Some(operation_id),
        }
    }

    fn disarmed(lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            lifecycle,
            operation_id: None,
        }
    }

    fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    fn disarm(&mut self) -> Option<String> {
        self.operation_id.take()
    }
}

impl Drop for FailOnDrop {
    fn drop(&mut self) {
        if let Some(id) = self.operation_id.take() {
            self.lifecycle.fail(&id, ABORTED_MESSAGE, None);
        }
    }
}
