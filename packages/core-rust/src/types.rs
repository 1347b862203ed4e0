use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of long-running work an operation represents.
///
/// The set is closed: optimization rules, tracking and cacheability policy are
/// keyed on this enum rather than on free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ContentAnalysis,
    Search,
    MultiStepExecution,
    FileBatch,
    Backup,
    BulkReorganization,
    GenerativeProcessing,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [OperationKind; 7] = [
        OperationKind::ContentAnalysis,
        OperationKind::Search,
        OperationKind::MultiStepExecution,
        OperationKind::FileBatch,
        OperationKind::Backup,
        OperationKind::BulkReorganization,
        OperationKind::GenerativeProcessing,
    ];

    /// Wire name of the kind (matches the serde representation).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentAnalysis => "content_analysis",
            Self::Search => "search",
            Self::MultiStepExecution => "multi_step_execution",
            Self::FileBatch => "file_batch",
            Self::Backup => "backup",
            Self::BulkReorganization => "bulk_reorganization",
            Self::GenerativeProcessing => "generative_processing",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an operation.
///
/// State machine: Starting -> Running -> {Completed | Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Registered, no progress reported yet.
    Starting,
    /// At least one progress update has been applied.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
}

impl OperationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}
