//! Tracked operation record and the progress/ETA arithmetic behind it.
//!
//! [`Operation`] only knows how to move itself through its state machine; the
//! registry that owns live operations lives in the server crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::format_timestamp;
use crate::messages::ProgressUpdatePayload;
use crate::types::{OperationKind, OperationStatus};

/// Message attached to the notification emitted when an operation is registered.
pub const STARTING_MESSAGE: &str = "Starting operation...";

/// One tracked unit of long-running work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    /// Routing key for progress subscribers.
    pub scope: String,
    /// Always at least 1.
    pub total_steps: u32,
    /// In `[0, total_steps]`.
    pub current_step: u32,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
    pub status: OperationStatus,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub description: String,
    pub last_message: String,
    /// Set only when `status` is `Failed`.
    pub error: Option<String>,
    pub eta_seconds: Option<f64>,
}

impl Operation {
    /// Creates an operation in the `Starting` state at zero progress.
    ///
    /// A `total_steps` of zero is clamped to one.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: OperationKind,
        scope: impl Into<String>,
        total_steps: u32,
        description: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            scope: scope.into(),
            total_steps: total_steps.max(1),
            current_step: 0,
            progress: 0.0,
            status: OperationStatus::Starting,
            started_at_ms: now_ms,
            ended_at_ms: None,
            description: description.into(),
            last_message: STARTING_MESSAGE.to_string(),
            error: None,
            eta_seconds: None,
        }
    }

    /// Wall-clock seconds since the operation started, as seen at `now_ms`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_secs(&self, now_ms: u64) -> f64 {
        now_ms.saturating_sub(self.started_at_ms) as f64 / 1000.0
    }

    /// Applies a progress report and moves the operation to `Running`.
    ///
    /// Without an override the step never moves backwards, so progress is
    /// non-decreasing. An override replaces both the step and the fraction.
    pub fn advance(
        &mut self,
        step: u32,
        message: impl Into<String>,
        progress_override: Option<f64>,
        now_ms: u64,
    ) {
        let step = step.min(self.total_steps);
        match progress_override {
            Some(fraction) => {
                self.current_step = step;
                self.progress = clamp_fraction(fraction);
            }
            None => {
                self.current_step = self.current_step.max(step);
                self.progress = step_fraction(self.current_step, self.total_steps);
            }
        }
        self.status = OperationStatus::Running;
        self.last_message = message.into();
        self.eta_seconds = estimate_eta(self.elapsed_secs(now_ms), self.progress);
    }

    /// Marks the operation `Completed` at full progress.
    pub fn finish(&mut self, message: impl Into<String>, now_ms: u64) {
        self.status = OperationStatus::Completed;
        self.current_step = self.total_steps;
        self.progress = 1.0;
        self.ended_at_ms = Some(now_ms);
        self.last_message = message.into();
        self.eta_seconds = estimate_eta(self.elapsed_secs(now_ms), self.progress);
    }

    /// Marks the operation `Failed`, keeping whatever progress it had reached.
    pub fn fail(&mut self, error: impl Into<String>, now_ms: u64) {
        let error = error.into();
        self.status = OperationStatus::Failed;
        self.ended_at_ms = Some(now_ms);
        self.last_message.clone_from(&error);
        self.error = Some(error);
        self.eta_seconds = None;
    }

    /// Builds the wire payload describing the current state.
    #[must_use]
    pub fn progress_update(
        &self,
        now_ms: u64,
        result_data: Option<Value>,
        error_data: Option<Value>,
    ) -> ProgressUpdatePayload {
        ProgressUpdatePayload {
            operation_id: self.id.clone(),
            operation_type: self.kind,
            progress: self.progress,
            progress_percentage: self.progress * 100.0,
            current_step: self.current_step,
            total_steps: self.total_steps,
            message: self.last_message.clone(),
            eta_seconds: self.eta_seconds,
            status: self.status,
            timestamp: format_timestamp(now_ms),
            result_data,
            error_data,
        }
    }
}

/// Linear remaining-time estimate.
///
/// `None` while no progress has been made; otherwise
/// `max(0, elapsed / progress - elapsed)`.
#[must_use]
pub fn estimate_eta(elapsed_secs: f64, progress: f64) -> Option<f64> {
    if progress.is_nan() || progress <= 0.0 {
        return None;
    }
    let estimated_total = elapsed_secs / progress;
    Some((estimated_total - elapsed_secs).max(0.0))
}

/// `current / total` as a fraction; a zero total reads as complete.
#[must_use]
pub fn step_fraction(current: u32, total: u32) -> f64 {
    if total == 0 {
        return 1.0;
    }
    clamp_fraction(f64::from(current) / f64::from(total))
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}
