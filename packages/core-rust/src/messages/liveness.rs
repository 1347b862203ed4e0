use serde::{Deserialize, Serialize};

/// Body of a `pong` reply to a subscriber's `ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongData {
    /// RFC 3339 UTC server time.
    pub timestamp: String,
}
