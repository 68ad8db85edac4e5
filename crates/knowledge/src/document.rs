//! Indexed documents: one per historical channel message.

use banter_core::history::{HistoryChannel, HistoryMessage};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::tokenize::tokenize;

/// Author label stored for messages sent by automated accounts.
pub const BOT_AUTHOR: &str = "[bot]";

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[!&]?[0-9]+>").expect("mention pattern is valid"));

/// One ingested chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Source message ID (identity)
    pub message_id: String,
    pub channel_id: String,
    pub channel_name: String,
    /// Display label, or [`BOT_AUTHOR`] for automated senders
    pub author: String,
    /// De-identified text, cut to the ingestion limit
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Document {
    /// Convert a raw history message into a document.
    ///
    /// Returns `None` when the trimmed content is empty. User and role
    /// mentions are replaced with `@user`; content is cut to
    /// `max_content_chars` characters.
    pub fn from_history(
        channel: &HistoryChannel,
        message: &HistoryMessage,
        max_content_chars: usize,
    ) -> Option<Self> {
        let trimmed = message.content.trim();
        if trimmed.is_empty() {
            return None;
        }

        let deidentified = MENTION.replace_all(trimmed, "@user");
        let content: String = deidentified.chars().take(max_content_chars).collect();
        if content.trim().is_empty() {
            return None;
        }

        let author = if message.author_is_bot {
            BOT_AUTHOR.to_string()
        } else {
            message.author.clone()
        };

        Some(Self {
            message_id: message.id.clone(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            author,
            content,
            timestamp: message.timestamp,
        })
    }
}

/// A document plus its precomputed distinct token set.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Document,
    pub tokens: HashSet<String>,
}

impl IndexedDocument {
    pub fn new(document: Document) -> Self {
        let tokens = tokenize(&document.content).into_iter().collect();
        Self { document, tokens }
    }
}
