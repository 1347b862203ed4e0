use std::time::Duration;

use opwatch_core::OperationKind;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::lifecycle::LifecycleError;
use crate::optimize::{ExecutionContext, OptimizationTag};

/// One logical call to [`Orchestrator::execute`](super::Orchestrator::execute).
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Caller-level operation name (e.g. `"vault_analyze"`). Together with
    /// `kind` it namespaces the cache key.
    pub category: String,
    pub kind: OperationKind,
    /// Where progress notifications are delivered.
    pub scope: String,
    pub payload: Value,
    pub context: ExecutionContext,
    /// Step count announced for tracked operations.
    pub total_steps: u32,
    pub description: Option<String>,
    /// Id for the tracked operation; a UUID is generated when absent.
    pub operation_id: Option<String>,
}

impl ExecuteRequest {
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        kind: OperationKind,
        scope: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            category: category.into(),
            kind,
            scope: scope.into(),
            payload,
            context: ExecutionContext::default(),
            total_steps: 1,
            description: None,
            operation_id: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_total_steps(mut self, total_steps: u32) -> Self {
        self.total_steps = total_steps;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub(crate) fn description_or_default(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} ({})", self.category, self.kind))
    }
}

/// Per-call performance record. Produced once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Wall-clock duration of the call; for hits, of the cache lookup only.
    #[serde(rename = "response_time_secs", serialize_with = "serialize_secs")]
    pub response_time: Duration,
    pub cache_hit: bool,
    pub optimizations_applied: Vec<OptimizationTag>,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Successful result of [`Orchestrator::execute`](super::Orchestrator::execute).
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub result: Value,
    pub metrics: PerformanceMetrics,
    /// Id of the tracked operation, if one was started.
    pub operation_id: Option<String>,
}

/// Errors surfaced by [`Orchestrator::execute`](super::Orchestrator::execute).
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The work itself failed. Displays exactly as the underlying error.
    #[error(transparent)]
    Work(anyhow::Error),
    /// The caller-supplied operation id is already in use.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl ExecuteError {
    /// The work error, if this is one.
    #[must_use]
    pub fn into_work_error(self) -> Option<anyhow::Error> {
        match self {
            Self::Work(err) => Some(err),
            Self::Lifecycle(_) => None,
        }
    }
}
