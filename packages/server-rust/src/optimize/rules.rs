//! Built-in optimization rules.
//!
//! A field that is absent or JSON `null` counts as unset.

use serde_json::{Map, Value};

use super::{ExecutionContext, OptimizationTag, OptimizerLimits};

/// Search: cap the free-text query length and inject a result limit.
pub fn search(
    fields: &mut Map<String, Value>,
    _context: &ExecutionContext,
    limits: &OptimizerLimits,
) -> Vec<OptimizationTag> {
    let mut tags = Vec::new();

    if let Some(Value::String(query)) = fields.get_mut("query") {
        if query.chars().count() > limits.max_query_chars {
            *query = query.chars().take(limits.max_query_chars).collect();
            tags.push(OptimizationTag::QueryTruncation);
        }
    }

    if is_unset(fields, "limit") {
        fields.insert("limit".to_string(), Value::from(limits.default_result_limit));
        tags.push(OptimizationTag::ResultLimiting);
    }

    tags
}

/// Content analysis: inject a traversal depth and drop full bodies unless
/// the caller asked for them.
pub fn content_analysis(
    fields: &mut Map<String, Value>,
    context: &ExecutionContext,
    limits: &OptimizerLimits,
) -> Vec<OptimizationTag> {
    let mut tags = Vec::new();

    if is_unset(fields, "max_depth") {
        fields.insert("max_depth".to_string(), Value::from(limits.default_max_depth));
        tags.push(OptimizationTag::DepthLimiting);
    }

    if !context.content_required {
        fields.insert("include_content".to_string(), Value::Bool(false));
        tags.push(OptimizationTag::ContentExclusion);
    }

    tags
}

/// Multi-step execution: default to running independent sub-steps in parallel.
pub fn multi_step_execution(
    fields: &mut Map<String, Value>,
    _context: &ExecutionContext,
    _limits: &OptimizerLimits,
) -> Vec<OptimizationTag> {
    if is_unset(fields, "parallel") {
        fields.insert("parallel".to_string(), Value::Bool(true));
        return vec![OptimizationTag::ParallelExecution];
    }
    Vec::new()
}

fn is_unset(fields: &Map<String, Value>, name: &str) -> bool {
    fields.get(name).map_or(true, Value::is_null)
}
