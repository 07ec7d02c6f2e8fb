//! Command Sink Port (Driven Port)
//!
//! Outbound control commands on the feed connection.

use async_trait::async_trait;

use crate::domain::directory::ChannelId;
use crate::error::ConnectionError;

/// Control command written to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start receiving a channel.
    Subscribe(ChannelId),
    /// Stop receiving a channel.
    Unsubscribe(ChannelId),
}

impl Command {
    /// Channel the command targets.
    #[must_use]
    pub const fn channel(self) -> ChannelId {
        match self {
            Self::Subscribe(id) | Self::Unsubscribe(id) => id,
        }
    }

    /// Wire verb.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

/// Port for writing commands to a live connection.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Ensure a live connection and write one command.
    ///
    /// Returns the generation of the connection the command was written on.
    /// Failed writes are not retried.
    async fn send(&self, command: Command) -> Result<u64, ConnectionError>;

    /// Current connection generation; zero before the first dial.
    fn generation(&self) -> u64;
}
