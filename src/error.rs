use thiserror::Error;

/// Errors produced while decoding a backend frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("malformed payload for {event}: {reason}")]
    Malformed { event: String, reason: String },

    #[error("frame is not a JSON envelope: {0}")]
    NotJson(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// A command named a work id that has no registered session.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The scroll search ran out of page without locating the element.
    #[error("selector not found after exhausting scroll range: {0}")]
    SelectorNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BridgeError::Timeout(e.to_string())
        } else {
            BridgeError::Backend(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Backend(format!("invalid JSON: {}", e))
    }
}
