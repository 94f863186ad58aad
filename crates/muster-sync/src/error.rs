use thiserror::Error;
use uuid::Uuid;

/// A failed call to the chat server. Cloneable so one result can both update
/// the local view and be handed back to the caller.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("send failed: {0}")]
    Send(TransportError),

    #[error("request failed: {0}")]
    Request(TransportError),

    #[error("message needs text or media")]
    EmptyMessage,

    /// `retry` was given an id that is not a failed local message.
    #[error("no failed message with local id {0}")]
    UnknownLocalMessage(Uuid),

    #[error("chat view is closed")]
    Stopped,
}
