//! Feed Control Messages
//!
//! Outbound text frames are single JSON objects:
//!
//! ```json
//! {"command": "subscribe", "channel": 1002}
//! {"command": "unsubscribe", "channel": 148}
//! ```
//!
//! Inbound traffic is positional JSON arrays and is handled by the codec.

use serde::{Deserialize, Serialize};

use crate::application::ports::Command;
use crate::domain::directory::ChannelId;

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandVerb {
    /// Start receiving a channel.
    Subscribe,
    /// Stop receiving a channel.
    Unsubscribe,
}

/// Wire form of a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Verb.
    pub command: CommandVerb,
    /// Numeric channel id.
    pub channel: ChannelId,
}

impl From<Command> for CommandMessage {
    fn from(command: Command) -> Self {
        match command {
            Command::Subscribe(channel) => Self {
                command: CommandVerb::Subscribe,
                channel,
            },
            Command::Unsubscribe(channel) => Self {
                command: CommandVerb::Unsubscribe,
                channel,
            },
        }
    }
}

impl From<CommandMessage> for Command {
    fn from(message: CommandMessage) -> Self {
        match message.command {
            CommandVerb::Subscribe => Self::Subscribe(message.channel),
            CommandVerb::Unsubscribe => Self::Unsubscribe(message.channel),
        }
    }
}

impl CommandMessage {
    /// Serialize to the JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_wire_shape() {
        let json = CommandMessage::from(Command::Subscribe(ChannelId::TICKER))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"command":"subscribe","channel":1002}"#);
    }

    #[test]
    fn unsubscribe_wire_shape() {
        let json = CommandMessage::from(Command::Unsubscribe(ChannelId(148)))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"command":"unsubscribe","channel":148}"#);
    }

    #[test]
    fn parses_back_into_command() {
        let message: CommandMessage =
            serde_json::from_str(r#"{"command":"subscribe","channel":121}"#).unwrap();
        assert_eq!(Command::from(message), Command::Subscribe(ChannelId(121)));
    }
}
