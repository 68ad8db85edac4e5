//! Member lookups for profile questions ("tell me something about @x").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// How many recent channel messages are searched for a member's last post.
pub const RECENT_SCAN_LIMIT: u8 = 50;

/// What the server knows about one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub user_id: String,
    pub display_name: String,
    /// `None` if the platform did not report a join date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    pub account_created: DateTime<Utc>,
    /// Role names, highest position first, `@everyone` excluded
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Source of member profiles and recent activity.
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// Look up `user_id` in `guild_id`. `Ok(None)` means no such member.
    async fn member_profile(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberProfile>, ChannelError>;

    /// The newest of the last [`RECENT_SCAN_LIMIT`] messages in `channel_id`
    /// written by `user_id`, skipping `exclude_message_id`.
    async fn recent_message_by(
        &self,
        channel_id: &str,
        user_id: &str,
        exclude_message_id: &str,
    ) -> Result<Option<String>, ChannelError>;
}
