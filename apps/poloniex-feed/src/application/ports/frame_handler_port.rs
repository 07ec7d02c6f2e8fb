//! Frame Handler Port (Driver Port)
//!
//! Receives every text frame the read loop pulls off the socket.

use chrono::{DateTime, Utc};

/// Consumer of raw frames.
///
/// Called serially from the read task, in wire order. Implementations must
/// not block; a slow handler stalls the socket.
pub trait FrameHandler: Send + Sync {
    /// Handle one frame read at `received_at`.
    fn on_frame(&self, text: &str, received_at: DateTime<Utc>);
}

impl<F> FrameHandler for F
where
    F: Fn(&str, DateTime<Utc>) + Send + Sync,
{
    fn on_frame(&self, text: &str, received_at: DateTime<Utc>) {
        self(text, received_at);
    }
}
