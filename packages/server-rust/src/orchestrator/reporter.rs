use std::fmt;
use std::sync::Arc;

use crate::lifecycle::LifecycleManager;

/// Handle given to work closures for reporting checkpoints.
///
/// For untracked operation kinds every call is a no-op returning `false`.
#[derive(Clone)]
pub struct ProgressReporter {
    tracked: Option<(Arc<LifecycleManager>, String)>,
}

impl ProgressReporter {
    pub(crate) fn tracked(lifecycle: Arc<LifecycleManager>, operation_id: String) -> Self {
        Self {
            tracked: Some((lifecycle, operation_id)),
        }
    }

    /// A reporter that discards every checkpoint.
    #[must_use]
    pub fn untracked() -> Self {
        Self { tracked: None }
    }

    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracked.is_some()
    }

    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.tracked.as_ref().map(|(_, id)| id.as_str())
    }

    /// Reports that `step` of the operation's steps is done.
    pub fn checkpoint(&self, step: u32, message: impl Into<String>) -> bool {
        match &self.tracked {
            Some((lifecycle, id)) => lifecycle.update(id, step, message, None),
            None => false,
        }
    }

    /// Reports `step` with an explicit progress fraction, for work whose
    /// progress is not linear in steps.
    pub fn checkpoint_with_progress(
        &self,
        step: u32,
        message: impl Into<String>,
        fraction: f64,
    ) -> bool {
        match &self.tracked {
            Some((lifecycle, id)) => lifecycle.update(id, step, message, Some(fraction)),
            None => false,
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("operation_id", &self.operation_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_reporter_ignores_checkpoints() {
        let reporter = ProgressReporter::untracked();
        assert!(!reporter.is_tracked());
        assert!(reporter.operation_id().is_none());
        assert!(!reporter.checkpoint(1, "ignored"));
        assert!(!reporter.checkpoint_with_progress(1, "ignored", 0.5));
        assert_eq!(
            format!("{reporter:?}"),
            "ProgressReporter { operation_id: None }"
        );
    }
}
