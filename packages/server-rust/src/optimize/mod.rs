//! Request-shaping heuristics applied before uncached work runs.
//!
//! The selector is a table from [`OperationKind`] to a pure rule function.
//! Kinds without a rule pass through unchanged with no tags.

pub mod rules;

use std::collections::HashMap;
use std::fmt;

use opwatch_core::OperationKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label recording which heuristic shaped a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTag {
    /// Response served from the cache.
    Caching,
    QueryTruncation,
    ResultLimiting,
    DepthLimiting,
    ContentExclusion,
    ParallelExecution,
}

impl OptimizationTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caching => "caching",
            Self::QueryTruncation => "query_truncation",
            Self::ResultLimiting => "result_limiting",
            Self::DepthLimiting => "depth_limiting",
            Self::ContentExclusion => "content_exclusion",
            Self::ParallelExecution => "parallel_execution",
        }
    }
}

impl fmt::Display for OptimizationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied hints that rules may consult.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Full content bodies must be included in the response.
    #[serde(default)]
    pub content_required: bool,
}

/// Bounds injected or enforced by the built-in rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerLimits {
    /// Longest free-text `query` kept, in characters.
    pub max_query_chars: usize,
    /// `limit` injected into search requests that carry none.
    pub default_result_limit: u64,
    /// `max_depth` injected into analysis requests that carry none.
    pub default_max_depth: u64,
}

impl Default for OptimizerLimits {
    fn default() -> Self {
        Self {
            max_query_chars: 500,
            default_result_limit: 50,
            default_max_depth: 3,
        }
    }
}

/// A pure request-shaping function. Mutates the payload object in place and
/// returns the tags for what it changed.
pub type Rule =
    fn(&mut Map<String, Value>, &ExecutionContext, &OptimizerLimits) -> Vec<OptimizationTag>;

/// Output of [`StrategySelector::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedRequest {
    pub payload: Value,
    pub tags: Vec<OptimizationTag>,
}

/// Maps each operation kind to its optimization rule.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    rules: HashMap<OperationKind, Rule>,
    limits: OptimizerLimits,
}

impl StrategySelector {
    /// Creates a selector with the built-in rules registered.
    #[must_use]
    pub fn new(limits: OptimizerLimits) -> Self {
        let mut selector = Self::empty(limits);
        selector.register(OperationKind::Search, rules::search);
        selector.register(OperationKind::ContentAnalysis, rules::content_analysis);
        selector.register(OperationKind::MultiStepExecution, rules::multi_step_execution);
        selector
    }

    /// Creates a selector with no rules; every kind passes through unchanged.
    #[must_use]
    pub fn empty(limits: OptimizerLimits) -> Self {
        Self {
            rules: HashMap::new(),
            limits,
        }
    }

    /// Installs `rule` for `kind`, returning the rule it replaced.
    pub fn register(&mut self, kind: OperationKind, rule: Rule) -> Option<Rule> {
        self.rules.insert(kind, rule)
    }

    #[must_use]
    pub fn limits(&self) -> &OptimizerLimits {
        &self.limits
    }

    /// Shapes `payload` for `kind`. The input is left untouched.
    ///
    /// Non-object payloads and kinds without a rule come back unchanged with
    /// no tags.
    #[must_use]
    pub fn apply(
        &self,
        kind: OperationKind,
        payload: &Value,
        context: &ExecutionContext,
    ) -> OptimizedRequest {
        let mut payload = payload.clone();
        let tags = match (self.rules.get(&kind), payload.as_object_mut()) {
            (Some(rule), Some(fields)) => rule(fields, context, &self.limits),
            _ => Vec::new(),
        };
        OptimizedRequest { payload, tags }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(OptimizerLimits::default())
    }
}
