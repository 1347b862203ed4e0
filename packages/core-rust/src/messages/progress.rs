use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{OperationKind, OperationStatus};

/// Body of a `progress_update` message.
///
/// Optional fields serialize as `null` rather than being omitted so that
/// subscribers always see the full shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdatePayload {
    pub operation_id: String,
    pub operation_type: OperationKind,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
    /// `progress * 100`.
    pub progress_percentage: f64,
    pub current_step: u32,
    pub total_steps: u32,
    pub message: String,
    pub eta_seconds: Option<f64>,
    pub status: OperationStatus,
    /// RFC 3339 UTC time the update was produced.
    pub timestamp: String,
    pub result_data: Option<Value>,
    pub error_data: Option<Value>,
}
