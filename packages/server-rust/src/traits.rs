use opwatch_core::ServerMessage;

/// Errors a transport may report from [`ProgressPublisher::publish`].
///
/// The lifecycle manager logs and discards these; they never reach the
/// caller driving an operation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort delivery of messages to every subscriber of a scope.
///
/// Implementations must not block: a slow or absent subscriber may lose the
/// message but must never delay the publisher.
pub trait ProgressPublisher: Send + Sync {
    /// Publish `message` to the subscribers of `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed to the transport at all.
    fn publish(&self, scope: &str, message: &ServerMessage) -> Result<(), PublishError>;
}

/// Publisher that discards everything, for embedding without a transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl ProgressPublisher for NullPublisher {
    fn publish(&self, _scope: &str, _message: &ServerMessage) -> Result<(), PublishError> {
        Ok(())
    }
}
