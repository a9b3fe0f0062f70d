//! Error types for entsync-client.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Error returned by a registered handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for all sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable transport mechanism (no connector configured, or no async runtime).
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Send or close attempted while the connection is not open.
    #[error("Not connected")]
    NotConnected,

    /// Inbound text is not well-formed JSON.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Message is JSON but misses or mistypes a required field.
    #[error("Schema error: {0}")]
    Schema(String),

    /// No handler resolved for the message. Non-fatal.
    #[error("Unhandled message: command={command}, type={entity_type}")]
    Unhandled {
        command: String,
        entity_type: String,
    },

    /// Error produced by a registered handler, passed through unchanged.
    #[error("Handler error for ({command}, {entity_type}): {source}")]
    Handler {
        command: String,
        entity_type: String,
        #[source]
        source: HandlerError,
    },

    /// Endpoint URL could not be parsed or has an unsupported scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Sub-protocol name is empty or not a valid header token.
    #[error("Invalid sub-protocol: {0:?}")]
    InvalidProtocol(String),

    /// Requested lifecycle transition is not legal from the current state.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Refused to send an empty message.
    #[error("Empty message")]
    EmptyMessage,

    /// Transport-level failure (handshake, read or write).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport did not open within the configured timeout.
    #[error("Open timed out after {0:?}")]
    OpenTimeout(Duration),

    /// Outbound channel closed underneath a send.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl SyncError {
    /// True for failures tied to one inbound message rather than the connection.
    pub fn is_message_level(&self) -> bool {
        matches!(
            self,
            SyncError::Parse(_)
                | SyncError::Schema(_)
                | SyncError::Unhandled { .. }
                | SyncError::Handler { .. }
        )
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

/// Result type alias using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;
