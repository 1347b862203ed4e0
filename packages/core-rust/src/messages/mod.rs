//! JSON messages exchanged with progress subscribers.
//!
//! Every outbound frame is an envelope of the form
//! `{"type": "<snake_case variant>", "data": {...}}`; the only inbound frame
//! understood is `{"type": "ping"}`.

pub mod liveness;
pub mod progress;

use serde::{Deserialize, Serialize};

pub use liveness::PongData;
pub use progress::ProgressUpdatePayload;

/// Server-to-subscriber message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    ProgressUpdate(ProgressUpdatePayload),
    Pong(PongData),
}

impl ServerMessage {
    /// Encodes the message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload value cannot be represented as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Subscriber-to-server message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

impl ClientMessage {
    /// Parses an inbound JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or an unknown `type`.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
