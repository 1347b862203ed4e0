//! Registry of in-flight operations and their lifecycle transitions.
//!
//! Every transition emits a `progress_update` to the operation's scope
//! through a [`ProgressPublisher`]. Publishing is best-effort: failures are
//! logged and dropped, never returned to the caller driving the operation.
//!
//! `update`, `complete` and `fail` on an id that is unknown or already
//! finished are ignored (logged at `debug`) and report `false`. Only a
//! duplicate `start` is an error.

pub mod history;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use opwatch_core::{ClockSource, Operation, OperationKind, ServerMessage};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use history::OperationHistory;

use crate::traits::ProgressPublisher;

/// Lifecycle manager configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Number of finished operations retained for lookup.
    pub history_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
        }
    }
}

/// Errors reported by [`LifecycleManager::start`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("operation already active: {id}")]
    DuplicateOperation { id: String },
}

/// Owns every active [`Operation`] and the bounded history of finished ones.
///
/// Transitions on one id are atomic with respect to each other (per-key
/// locking in the underlying `DashMap`). Each notification is published
/// while that lock is held, so subscribers never see a stale state after a
/// newer one. Publishers must therefore not call back into the manager.
pub struct LifecycleManager {
    active: DashMap<String, Operation>,
    history: Mutex<OperationHistory>,
    publisher: Arc<dyn ProgressPublisher>,
    clock: Arc<dyn ClockSource>,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(
        publisher: Arc<dyn ProgressPublisher>,
        clock: Arc<dyn ClockSource>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            active: DashMap::new(),
            history: Mutex::new(OperationHistory::new(config.history_capacity)),
            publisher,
            clock,
        }
    }

    /// Registers a new operation in `Starting` and announces it at 0%.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::DuplicateOperation` if `id` is already active.
    pub fn start(
        &self,
        id: impl Into<String>,
        kind: OperationKind,
        scope: impl Into<String>,
        total_steps: u32,
        description: impl Into<String>,
    ) -> Result<Operation, LifecycleError> {
        let now = self.clock.now();
        let snapshot = match self.active.entry(id.into()) {
            Entry::Occupied(entry) => {
                return Err(LifecycleError::DuplicateOperation {
                    id: entry.key().clone(),
                });
            }
            Entry::Vacant(entry) => {
                let operation =
                    Operation::new(entry.key().clone(), kind, scope, total_steps, description, now);
                let operation = entry.insert(operation);
                self.emit(&operation, now, None, None);
                operation.clone()
            }
        };

        info!(
            operation_id = %snapshot.id,
            kind = %snapshot.kind,
            scope = %snapshot.scope,
            total_steps = snapshot.total_steps,
            "operation started"
        );
        metrics::counter!("opwatch_operations_started_total", "kind" => snapshot.kind.as_str())
            .increment(1);
        Ok(snapshot)
    }

    /// Records progress on an active operation.
    ///
    /// Progress is `progress_override` when given, otherwise
    /// `current_step / total_steps`. Returns `false` if `id` is not active.
    pub fn update(
        &self,
        id: &str,
        current_step: u32,
        message: impl Into<String>,
        progress_override: Option<f64>,
    ) -> bool {
        let now = self.clock.now();
        let Some(mut operation) = self.active.get_mut(id) else {
            debug!(operation_id = id, "ignoring update for inactive operation");
            return false;
        };
        operation.advance(current_step, message, progress_override, now);
        self.emit(&operation, now, None, None);

        debug!(
            operation_id = id,
            step = operation.current_step,
            progress = operation.progress,
            "operation progress"
        );
        true
    }

    /// Finishes an active operation successfully and archives it.
    ///
    /// Returns `false` if `id` is not active.
    pub fn complete(&self, id: &str, message: impl Into<String>, result_data: Option<Value>) -> bool {
        let now = self.clock.now();
        let Some(operation) = self.finish_with(id, now, result_data, None, |operation| {
            operation.finish(message, now);
        }) else {
            debug!(operation_id = id, "ignoring completion for inactive operation");
            return false;
        };

        info!(
            operation_id = id,
            elapsed_secs = operation.elapsed_secs(now),
            "operation completed"
        );
        metrics::counter!("opwatch_operations_completed_total", "kind" => operation.kind.as_str())
            .increment(1);
        true
    }

    /// Finishes an active operation with an error and archives it.
    ///
    /// Returns `false` if `id` is not active.
    pub fn fail(
        &self,
        id: &str,
        error_message: impl Into<String>,
        error_details: Option<Value>,
    ) -> bool {
        let now = self.clock.now();
        let Some(operation) = self.finish_with(id, now, None, error_details, |operation| {
            operation.fail(error_message, now);
        }) else {
            debug!(operation_id = id, "ignoring failure for inactive operation");
            return false;
        };

        warn!(
            operation_id = id,
            error = operation.error.as_deref().unwrap_or_default(),
            "operation failed"
        );
        metrics::counter!("opwatch_operations_failed_total", "kind" => operation.kind.as_str())
            .increment(1);
        true
    }

    /// Snapshot of the active operations addressed to `scope`, oldest first.
    #[must_use]
    pub fn active_for_scope(&self, scope: &str) -> Vec<Operation> {
        let mut operations: Vec<Operation> = self
            .active
            .iter()
            .filter(|entry| entry.value().scope == scope)
            .map(|entry| entry.value().clone())
            .collect();
        operations.sort_by(|a, b| {
            a.started_at_ms
                .cmp(&b.started_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        operations
    }

    /// Snapshot of an active operation.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Operation> {
        self.active.get(id).map(|entry| entry.value().clone())
    }

    /// Archived record of a finished operation.
    #[must_use]
    pub fn history(&self, id: &str) -> Option<Operation> {
        self.history.lock().get(id).cloned()
    }

    /// Active record if there is one, otherwise the archived record.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Operation> {
        self.get(id).or_else(|| self.history(id))
    }

    /// Up to `limit` finished operations, newest first.
    #[must_use]
    pub fn recent_history(&self, limit: usize) -> Vec<Operation> {
        self.history.lock().recent(limit)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Clock used for operation timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn ClockSource> {
        &self.clock
    }

    /// Applies a terminal transition to `id`, archives it, publishes it and
    /// only then drops it from the active map, all under the entry lock.
    fn finish_with(
        &self,
        id: &str,
        now: u64,
        result_data: Option<Value>,
        error_data: Option<Value>,
        transition: impl FnOnce(&mut Operation),
    ) -> Option<Operation> {
        let Entry::Occupied(mut entry) = self.active.entry(id.to_owned()) else {
            return None;
        };
        transition(entry.get_mut());
        self.history.lock().archive(entry.get().clone());
        self.emit(entry.get(), now, result_data, error_data);
        Some(entry.remove())
    }

    /// Publishes the current state of `operation`.
    ///
    /// Callers hold the operation's entry lock, so notifications for one id
    /// leave in the same order as its transitions.
    fn emit(
        &self,
        operation: &Operation,
        now: u64,
        result_data: Option<Value>,
        error_data: Option<Value>,
    ) {
        let message =
            ServerMessage::ProgressUpdate(operation.progress_update(now, result_data, error_data));
        if let Err(err) = self.publisher.publish(&operation.scope, &message) {
            warn!(
                operation_id = %operation.id,
                scope = %operation.scope,
                error = %err,
                "dropping progress notification"
            );
            metrics::counter!("opwatch_publish_failures_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use opwatch_core::{ManualClock, OperationStatus, STARTING_MESSAGE};
    use serde_json::json;

    use std::sync::mpsc;

    use super::*;
    use crate::test_support::{FailingPublisher, RecordingPublisher};
    use crate::traits::PublishError;

    const T0: u64 = 1_700_000_000_000;

    struct Harness {
        clock: Arc<ManualClock>,
        publisher: Arc<RecordingPublisher>,
        manager: LifecycleManager,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(T0));
        let publisher = Arc::new(RecordingPublisher::default());
        let manager =
            LifecycleManager::new(publisher.clone(), clock.clone(), &LifecycleConfig::default());
        Harness {
            clock,
            publisher,
            manager,
        }
    }

    #[test]
    fn start_registers_and_announces_zero_progress() {
        let h = harness();
        let op = h
            .manager
            .start("op1", OperationKind::ContentAnalysis, "v1", 4, "analyze vault")
            .unwrap();
        assert_eq!(op.status, OperationStatus::Starting);
        assert_eq!(h.manager.active_count(), 1);

        let messages = h.publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "v1");

        let updates = h.publisher.updates_for("op1");
        assert!(updates[0].progress.abs() < f64::EPSILON);
        assert_eq!(updates[0].message, STARTING_MESSAGE);
        assert_eq!(updates[0].status, OperationStatus::Starting);
        assert!(updates[0].eta_seconds.is_none());
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::Search, "v1", 1, "")
            .unwrap();
        let err = h
            .manager
            .start("op1", OperationKind::Search, "v1", 1, "")
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::DuplicateOperation {
                id: "op1".to_string()
            }
        );
        assert_eq!(h.publisher.updates_for("op1").len(), 1);
    }

    #[test]
    fn id_can_be_reused_after_completion() {
        let h = harness();
        h.manager.start("op1", OperationKind::Backup, "v1", 1, "").unwrap();
        assert!(h.manager.complete("op1", "done", None));
        assert!(h.manager.start("op1", OperationKind::Backup, "v1", 1, "").is_ok());
    }

    #[test]
    fn update_moves_to_running_with_eta() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::MultiStepExecution, "v1", 4, "")
            .unwrap();
        h.clock.advance(Duration::from_secs(10));
        assert!(h.manager.update("op1", 2, "step 2", None));

        let op = h.manager.get("op1").unwrap();
        assert_eq!(op.status, OperationStatus::Running);
        assert_eq!(op.current_step, 2);
        assert_eq!(op.eta_seconds, Some(10.0));

        let last = h.publisher.updates_for("op1").pop().unwrap();
        assert_eq!(last.eta_seconds, Some(10.0));
        assert!((last.progress_percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn update_honours_progress_override() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::GenerativeProcessing, "v1", 10, "")
            .unwrap();
        assert!(h.manager.update("op1", 1, "warming up", Some(0.3)));
        let op = h.manager.get("op1").unwrap();
        assert!((op.progress - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_is_monotonic_across_updates() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::FileBatch, "v1", 5, "")
            .unwrap();
        for step in 1..=5 {
            h.clock.advance(Duration::from_secs(1));
            h.manager.update("op1", step, format!("step {step}"), None);
        }
        let progress: Vec<f64> = h
            .publisher
            .updates_for("op1")
            .iter()
            .map(|u| u.progress)
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn complete_archives_and_carries_result() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::ContentAnalysis, "v1", 3, "")
            .unwrap();
        h.clock.advance(Duration::from_secs(3));
        assert!(h.manager.complete("op1", "all done", Some(json!({"notes": 12}))));

        assert!(h.manager.get("op1").is_none());
        let archived = h.manager.history("op1").unwrap();
        assert_eq!(archived.status, OperationStatus::Completed);
        assert_eq!(archived.ended_at_ms, Some(T0 + 3_000));
        assert!((archived.progress - 1.0).abs() < f64::EPSILON);

        let last = h.publisher.updates_for("op1").pop().unwrap();
        assert_eq!(last.status, OperationStatus::Completed);
        assert_eq!(last.result_data, Some(json!({"notes": 12})));
        assert!(last.error_data.is_none());
    }

    #[test]
    fn calls_after_completion_are_ignored() {
        let h = harness();
        h.manager.start("op1", OperationKind::Search, "v1", 2, "").unwrap();
        h.manager.complete("op1", "done", None);
        let archived = h.manager.history("op1").unwrap();
        let published = h.publisher.messages().len();

        assert!(!h.manager.update("op1", 1, "late", None));
        assert!(!h.manager.complete("op1", "again", None));
        assert!(!h.manager.fail("op1", "too late", None));

        assert_eq!(h.manager.history("op1").unwrap(), archived);
        assert_eq!(h.publisher.messages().len(), published);
    }

    #[test]
    fn calls_on_unknown_id_are_ignored() {
        let h = harness();
        assert!(!h.manager.update("ghost", 1, "?", None));
        assert!(!h.manager.complete("ghost", "?", None));
        assert!(!h.manager.fail("ghost", "?", None));
        assert!(h.publisher.messages().is_empty());
    }

    #[test]
    fn fail_archives_with_error() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::MultiStepExecution, "v1", 5, "")
            .unwrap();
        h.manager.update("op1", 2, "step 2", None);
        assert!(h.manager.fail("op1", "boom", Some(json!({"step": 3}))));

        let archived = h.manager.history("op1").unwrap();
        assert_eq!(archived.status, OperationStatus::Failed);
        assert_eq!(archived.error.as_deref(), Some("boom"));
        assert_eq!(archived.current_step, 2);

        let last = h.publisher.updates_for("op1").pop().unwrap();
        assert_eq!(last.status, OperationStatus::Failed);
        assert_eq!(last.error_data, Some(json!({"step": 3})));
    }

    #[test]
    fn active_for_scope_is_filtered_snapshot() {
        let h = harness();
        h.manager.start("a", OperationKind::Search, "v1", 1, "").unwrap();
        h.clock.advance(Duration::from_millis(5));
        h.manager.start("b", OperationKind::Search, "v1", 1, "").unwrap();
        h.manager.start("c", OperationKind::Search, "v2", 1, "").unwrap();

        let snapshot = h.manager.active_for_scope("v1");
        let ids: Vec<&str> = snapshot.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        h.manager.update("a", 1, "moved", None);
        assert_eq!(snapshot[0].status, OperationStatus::Starting);
        assert!(h.manager.active_for_scope("nobody").is_empty());
    }

    #[test]
    fn find_falls_back_to_history() {
        let h = harness();
        h.manager.start("a", OperationKind::Backup, "v1", 1, "").unwrap();
        assert_eq!(h.manager.find("a").unwrap().status, OperationStatus::Starting);
        h.manager.complete("a", "ok", None);
        assert_eq!(h.manager.find("a").unwrap().status, OperationStatus::Completed);
        assert!(h.manager.find("zzz").is_none());
        assert_eq!(h.manager.recent_history(10).len(), 1);
    }

    #[test]
    fn publish_failures_do_not_affect_lifecycle() {
        let clock = Arc::new(ManualClock::new(T0));
        let manager = LifecycleManager::new(
            Arc::new(FailingPublisher),
            clock,
            &LifecycleConfig::default(),
        );
        manager.start("op1", OperationKind::Search, "v1", 2, "").unwrap();
        assert!(manager.update("op1", 1, "half", None));
        assert!(manager.complete("op1", "done", None));
        assert_eq!(
            manager.history("op1").unwrap().status,
            OperationStatus::Completed
        );
    }

    #[test]
    fn concurrent_duplicate_starts_admit_exactly_one() {
        let h = harness();
        let successes = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        h.manager
                            .start("shared", OperationKind::Search, "v1", 1, "")
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .filter(|applied| *applied)
                .count()
        });
        assert_eq!(successes, 1);
        assert_eq!(h.manager.active_count(), 1);
    }

    #[test]
    fn concurrent_completion_archives_once() {
        let h = harness();
        h.manager.start("op1", OperationKind::Search, "v1", 1, "").unwrap();
        let completions = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| h.manager.complete("op1", "done", None)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .filter(|applied| *applied)
                .count()
        });
        assert_eq!(completions, 1);
        let finals = h
            .publisher
            .updates_for("op1")
            .into_iter()
            .filter(|u| u.status == OperationStatus::Completed)
            .count();
        assert_eq!(finals, 1);
    }

    /// Holds the first `running` notification until the test releases it.
    struct GatedPublisher {
        statuses: Mutex<Vec<OperationStatus>>,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl ProgressPublisher for GatedPublisher {
        fn publish(&self, _scope: &str, message: &ServerMessage) -> Result<(), PublishError> {
            let ServerMessage::ProgressUpdate(update) = message else {
                return Ok(());
            };
            if update.status == OperationStatus::Running {
                let gate = self.gate.lock().take();
                if let Some((entered, release)) = gate {
                    entered.send(()).unwrap();
                    release.recv().unwrap();
                }
            }
            self.statuses.lock().push(update.status);
            Ok(())
        }
    }

    #[test]
    fn completion_racing_a_slow_update_is_published_last() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let publisher = Arc::new(GatedPublisher {
            statuses: Mutex::new(Vec::new()),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        });
        let manager = LifecycleManager::new(
            publisher.clone(),
            Arc::new(ManualClock::new(T0)),
            &LifecycleConfig::default(),
        );
        manager
            .start("op1", OperationKind::FileBatch, "v1", 4, "")
            .unwrap();

        std::thread::scope(|s| {
            let updater = s.spawn(|| manager.update("op1", 1, "first file", None));
            entered_rx.recv().unwrap();
            let completer = s.spawn(|| manager.complete("op1", "done", None));
            // Let the completer reach the entry before the update is released.
            std::thread::sleep(Duration::from_millis(50));
            release_tx.send(()).unwrap();
            assert!(updater.join().unwrap());
            assert!(completer.join().unwrap());
        });

        assert_eq!(
            *publisher.statuses.lock(),
            vec![
                OperationStatus::Starting,
                OperationStatus::Running,
                OperationStatus::Completed
            ]
        );
        assert_eq!(
            manager.history("op1").unwrap().status,
            OperationStatus::Completed
        );
    }

    #[test]
    fn concurrent_updates_publish_non_decreasing_progress() {
        let h = harness();
        h.manager
            .start("op1", OperationKind::FileBatch, "v1", 64, "")
            .unwrap();

        std::thread::scope(|s| {
            for worker in 0..4u32 {
                let manager = &h.manager;
                s.spawn(move || {
                    for step in (worker..64).step_by(4) {
                        manager.update("op1", step, "tick", None);
                    }
                });
            }
        });

        let progress: Vec<f64> = h
            .publisher
            .updates_for("op1")
            .iter()
            .map(|u| u.progress)
            .collect();
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
