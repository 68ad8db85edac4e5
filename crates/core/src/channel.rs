//! Channel trait: the abstraction over the live chat gateway.
//!
//! A Channel connects Banter to a chat platform. It delivers messages
//! posted in the server and sends the bot's replies and icebreakers back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;

/// What kind of channel a live message was posted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChannelKind {
    /// A regular server text channel
    #[default]
    Text,
    /// A thread, with its approximate member count
    Thread { member_count: u32 },
    /// Voice text chat, forum, announcement, DM or anything else
    Other,
}

impl ChannelKind {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// A thread where more than two people are talking.
    pub fn is_busy_thread(&self) -> bool {
        matches!(self, Self::Thread { member_count } if *member_count > 2)
    }
}

/// A message observed on the live gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Platform message ID (used for reply threading)
    pub message_id: String,

    /// Server the message was posted in; `None` for direct messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,

    /// Text channel ID
    pub channel_id: String,

    /// Text channel name, without the leading `#`
    pub channel_name: String,

    #[serde(default)]
    pub channel_kind: ChannelKind,

    /// Sender identifier
    pub author_id: String,

    /// Human-readable sender name
    pub author_name: String,

    /// Whether the sender is an automated account
    #[serde(default)]
    pub author_is_bot: bool,

    /// The text content
    pub content: String,

    /// IDs of users mentioned in the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,

    /// When the message was posted
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    /// True if the message pings someone other than its author.
    pub fn mentions_other_user(&self) -> bool {
        self.mentions.iter().any(|id| id != &self.author_id)
    }
}

/// The core Channel trait.
///
/// Implementations handle platform-specific connection logic, rate limiting,
/// and authentication.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "discord").
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    ///
    /// Returns a receiver that yields incoming messages. The implementation
    /// owns the websocket connection internally.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<IncomingMessage, ChannelError>>,
        ChannelError,
    >;

    /// Send a message to a text channel, optionally as a reply.
    async fn send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<(), ChannelError>;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check: is the channel connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
