//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// Inbound chat message, normalized across transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (relay-assigned)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Where replies go (Telegram chat id)
    pub chat_id: String,
    /// Sender identifier; session state is keyed by this
    pub user_id: String,
    /// Message text, empty for non-text messages
    pub text: String,
}

impl ChannelMessage {
    /// Create a message with a fresh id.
    pub fn new(
        channel_type: ChannelType,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type,
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            text: text.into(),
        }
    }

    /// Get the channel type as a string.
    pub const fn channel_type_str(&self) -> &'static str {
        self.channel_type.as_str()
    }
}

/// Transient chat indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    Typing,
}

impl ChatAction {
    /// Bot API action name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_fields() {
        let msg = ChannelMessage::new(ChannelType::Telegram, "456", "user1", "Hello");
        assert_eq!(msg.chat_id, "456");
        assert_eq!(msg.user_id, "user1");
        assert_eq!(msg.text, "Hello");
        assert_eq!(msg.channel_type_str(), "telegram");
        assert_eq!(msg.id.len(), 36);
    }

    #[test]
    fn test_chat_action_wire_name() {
        assert_eq!(ChatAction::Typing.as_str(), "typing");
        assert_eq!(
            serde_json::to_string(&ChatAction::Typing).unwrap(),
            "\"typing\""
        );
    }
}
