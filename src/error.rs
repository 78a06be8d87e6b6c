//! Error types for memstate-client.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum MemstateError {
    /// The TCP connection to the engine could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying transport error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is closed; pending and future requests fail with this.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed frame or undecodable message envelope. Fatal to the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A response arrived for a request id that is not pending.
    #[error("No pending request for id {0}")]
    UnknownRequest(Uuid),

    /// An event arrived for a type tag with no registered handler.
    #[error("No handler for event type: {0}")]
    NoHandler(String),

    /// An event handler panicked. The panic is contained and the event dropped.
    #[error("Handler for {event_type} panicked: {message}")]
    HandlerPanicked {
        /// Tag of the event being handled.
        event_type: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The engine rejected or failed the request.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The response variant does not match the request kind.
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Response kind the request expects.
        expected: &'static str,
        /// Response kind that arrived.
        actual: &'static str,
    },

    /// No response arrived within the configured request timeout.
    #[error("Request timed out")]
    Timeout,

    /// A blocking call was made from inside an async runtime.
    #[error("blocking client called from within an async runtime")]
    BlockingInAsyncContext,
}

impl MemstateError {
    /// Whether this error ends the connection it occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Io(_) | Self::ConnectionClosed | Self::Protocol(_)
        )
    }
}

/// Result type alias using MemstateError.
pub type Result<T> = std::result::Result<T, MemstateError>;
