//! Feed Error Types
//!
//! Error taxonomy shared across the feed. Sequence gaps are not errors; they
//! are delivered as [`crate::domain::streaming::ResyncNeeded`] events.

use std::time::Duration;

use crate::application::ports::SnapshotError;
use crate::domain::directory::DirectoryError;

/// Dial, read and write failures on the feed connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Every dial attempt of one `ensure_connected` call failed.
    #[error("dial failed after {attempts} attempts: {last_error}")]
    DialExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// A single dial did not complete in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// WebSocket protocol or transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Command could not be serialized.
    #[error("command encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// No frame arrived within the read timeout.
    #[error("no frame received for {0:?}")]
    ReadTimeout(Duration),

    /// The socket this operation was using has been replaced or lost.
    #[error("connection lost")]
    Lost,

    /// The manager was closed.
    #[error("connection closed")]
    Closed,
}

/// Malformed or unparseable frame shape.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON array.
    #[error("frame is not an array")]
    NotAnArray,

    /// Frame is an empty array.
    #[error("empty frame")]
    Empty,

    /// First element is not a channel id.
    #[error("invalid channel id: {0}")]
    InvalidChannel(String),

    /// Payload does not have the shape its channel requires.
    #[error("invalid payload for channel {channel}: {reason}")]
    InvalidPayload {
        /// Channel id of the frame.
        channel: u32,
        /// What was wrong.
        reason: String,
    },
}

/// Crate-level error returned by the public control API.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Connection failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Name or id could not be resolved.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Snapshot collaborator failed.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(#[from] SnapshotError),

    /// The feed was closed.
    #[error("feed closed")]
    Closed,
}

impl FeedError {
    /// Whether this error is an unresolvable channel name.
    #[must_use]
    pub const fn is_unknown_channel(&self) -> bool {
        matches!(self, Self::Directory(DirectoryError::UnknownChannel(_)))
    }
}
