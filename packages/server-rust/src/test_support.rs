//! Publishers used by unit tests across modules.

use opwatch_core::{ProgressUpdatePayload, ServerMessage};
use parking_lot::Mutex;

use crate::traits::{ProgressPublisher, PublishError};

/// Records every published message in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, ServerMessage)>>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<(String, ServerMessage)> {
        self.published.lock().clone()
    }

    /// Progress updates published for `operation_id`, in order.
    pub fn updates_for(&self, operation_id: &str) -> Vec<ProgressUpdatePayload> {
        self.published
            .lock()
            .iter()
            .filter_map(|(_, msg)| match msg {
                ServerMessage::ProgressUpdate(update) if update.operation_id == operation_id => {
                    Some(update.clone())
                }
                _ => None,
            })
            .collect()
    }
}

impl ProgressPublisher for RecordingPublisher {
    fn publish(&self, scope: &str, message: &ServerMessage) -> Result<(), PublishError> {
        self.published.lock().push((scope.to_string(), message.clone()));
        Ok(())
    }
}

/// Rejects every message.
#[derive(Debug, Default)]
pub struct FailingPublisher;

impl ProgressPublisher for FailingPublisher {
    fn publish(&self, _scope: &str, _message: &ServerMessage) -> Result<(), PublishError> {
        Err(PublishError::Unavailable("subscriber gone".to_string()))
    }
}
