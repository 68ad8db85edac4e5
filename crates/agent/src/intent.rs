//! Message intent classification.
//!
//! Only [`Intent::Chat`] is answered by the model and
//! [`Intent::MemberInsight`] is answered from the member directory. The
//! other variants are recognised so the bot does not chat over them.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static GIF_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^gif\s*:\s*(.+)$").expect("gif pattern is valid"));
static GIF_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:send|post)\s+a?\s*(gif|sticker)\s+of\s+(.+)").expect("gif phrase pattern is valid")
});
static STICKER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sticker\s*:\s*(.+)$").expect("sticker pattern is valid"));
static SELF_INSIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)about\s+(?:me|my profile)").expect("self insight pattern is valid"));
static MEMBER_INSIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tell me something about\s+<@!?(\d+)>").expect("member insight pattern is valid")
});
static MARKET_STATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:magic eden|floor|collection)\b.*\b(?:stats|floor|listed|sales)\b|^!stats\b")
        .expect("market pattern is valid")
});
static QUESTION_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:who|what|when|where|why|how|does|do|is|are|can|should|could)\b")
        .expect("question pattern is valid")
});

/// What a chat message is asking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    /// Ordinary conversation
    Chat,
    Gif { query: String },
    Sticker { query: String },
    /// Profile question; `user_id` is `None` when asking about the author
    MemberInsight { user_id: Option<String> },
    MarketStats,
}

impl Intent {
    pub fn classify(text: &str) -> Self {
        let text = text.trim();

        if let Some(caps) = GIF_PREFIX.captures(text) {
            return Self::Gif {
                query: caps[1].trim().to_string(),
            };
        }
        if let Some(caps) = GIF_PHRASE.captures(text) {
            let query = caps[2].trim().to_string();
            return if caps[1].eq_ignore_ascii_case("sticker") {
                Self::Sticker { query }
            } else {
                Self::Gif { query }
            };
        }
        if let Some(caps) = STICKER_PREFIX.captures(text) {
            return Self::Sticker {
                query: caps[1].trim().to_string(),
            };
        }
        if SELF_INSIGHT.is_match(text) {
            return Self::MemberInsight { user_id: None };
        }
        if let Some(caps) = MEMBER_INSIGHT.captures(text) {
            return Self::MemberInsight {
                user_id: Some(caps[1].to_string()),
            };
        }
        if MARKET_STATS.is_match(text) {
            return Self::MarketStats;
        }
        Self::Chat
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, Self::Chat)
    }
}

/// Ends with `?` or opens with a question word.
pub fn is_question_like(text: &str) -> bool {
    let text = text.trim();
    text.ends_with('?') || QUESTION_OPENER.is_match(text)
}
