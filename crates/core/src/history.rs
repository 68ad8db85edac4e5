//! HistorySource trait: paginated access to past channel messages.
//!
//! The knowledge index build consumes exactly this contract: enumerate
//! candidate channels, probe read access, and page backwards through
//! history newest-first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;

/// Hard page size limit imposed by the Discord REST API.
pub const MAX_BATCH_SIZE: u8 = 100;

/// A text channel that may be scanned for history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryChannel {
    /// Platform channel ID
    pub id: String,

    /// Channel name, without the leading `#`
    pub name: String,

    /// Whether this is a plain text channel (voice, forum, category: false)
    #[serde(default = "default_true")]
    pub is_text: bool,
}

fn default_true() -> bool {
    true
}

impl HistoryChannel {
    pub fn text(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_text: true,
        }
    }
}

impl std::fmt::Display for HistoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.name, self.id)
    }
}

/// One raw message from a history page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Platform message ID, also the pagination cursor
    pub id: String,

    /// Display label of the sender
    pub author: String,

    /// Whether the sender is an automated account
    #[serde(default)]
    pub author_is_bot: bool,

    /// Raw text content
    pub content: String,

    /// When the message was posted
    pub timestamp: DateTime<Utc>,
}

/// Paginated channel history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Enumerate the channels this source can see.
    async fn list_channels(&self) -> std::result::Result<Vec<HistoryChannel>, ChannelError>;

    /// Whether the bot may read this channel's history.
    async fn can_read(&self, channel: &HistoryChannel) -> bool;

    /// Fetch one page of messages older than `before` (or the newest page
    /// when `None`), ordered newest-first. An empty page means the history
    /// is exhausted.
    async fn fetch_batch(
        &self,
        channel: &HistoryChannel,
        before: Option<&str>,
        limit: u8,
    ) -> std::result::Result<Vec<HistoryMessage>, ChannelError>;
}
