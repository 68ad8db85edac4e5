//! Member insight replies for "tell me something about @x" and
//! "about me" requests.

use banter_core::channel::IncomingMessage;
use banter_core::member::{MemberProfile, MemberSource};
use banter_knowledge::TimestampFormatter;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Reply when the member cannot be resolved.
pub const MEMBER_NOT_FOUND: &str = "I couldn't find that member, sorry.";

/// Roles listed, highest first.
pub const TOP_ROLES: usize = 3;

/// Longest quote of the member's recent message.
pub const RECENT_SNIPPET_CHARS: usize = 120;

/// Render a profile as a short multi-line reply.
///
/// A missing join date renders as `now`. Account age is whole days.
pub fn render_insight(
    profile: &MemberProfile,
    recent: Option<&str>,
    formatter: &dyn TimestampFormatter,
    now: DateTime<Utc>,
) -> String {
    let joined = profile.joined_at.unwrap_or(now);
    let age_days = now.signed_duration_since(profile.account_created).num_days().max(0);

    let mut lines = vec![
        format!("Joined: {}", formatter.format(&joined)),
        format!("Account age: {age_days} days"),
    ];
    if !profile.roles.is_empty() {
        let top: Vec<&str> = profile.roles.iter().take(TOP_ROLES).map(String::as_str).collect();
        lines.push(format!("Top roles: {}", top.join(", ")));
    }
    if let Some(text) = recent.map(str::trim).filter(|t| !t.is_empty()) {
        let quote: String = text.chars().take(RECENT_SNIPPET_CHARS).collect();
        lines.push(format!("Recent: “{quote}”"));
    }
    lines.join("\n")
}

/// Look up the member `message` asks about and describe them. `user_id`
/// of `None` means the author.
pub async fn describe_member(
    members: &dyn MemberSource,
    message: &IncomingMessage,
    user_id: Option<&str>,
    formatter: &dyn TimestampFormatter,
    now: DateTime<Utc>,
) -> String {
    let Some(guild_id) = message.guild_id.as_deref() else {
        return MEMBER_NOT_FOUND.to_string();
    };
    let user_id = user_id.unwrap_or(&message.author_id);

    let profile = match members.member_profile(guild_id, user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            debug!(user = %user_id, "Member not found");
            return MEMBER_NOT_FOUND.to_string();
        }
        Err(e) => {
            warn!(user = %user_id, error = %e, "Member lookup failed");
            return MEMBER_NOT_FOUND.to_string();
        }
    };

    let recent = members
        .recent_message_by(&message.channel_id, user_id, &message.message_id)
        .await
        .unwrap_or_else(|e| {
            debug!(channel = %message.channel_name, error = %e, "Recent message scan failed");
            None
        });

    render_insight(&profile, recent.as_deref(), formatter, now)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::responder::tests::message;
    use async_trait::async_trait;
    use banter_core::error::ChannelError;
    use banter_knowledge::FixedOffsetFormatter;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Profiles keyed by user id plus one recent message per user.
    #[derive(Default)]
    pub(crate) struct MemberDirectory {
        pub profiles: HashMap<String, MemberProfile>,
        pub recent: HashMap<String, String>,
        pub history_fails: bool,
        pub lookups: Mutex<Vec<(String, String)>>,
    }

    impl MemberDirectory {
        pub fn with(mut self, profile: MemberProfile) -> Self {
            self.profiles.insert(profile.user_id.clone(), profile);
            self
        }
    }

    #[async_trait]
    impl MemberSource for MemberDirectory {
        async fn member_profile(
            &self,
            guild_id: &str,
            user_id: &str,
        ) -> Result<Option<MemberProfile>, ChannelError> {
            self.lookups
                .lock()
                .unwrap()
                .push((guild_id.to_string(), user_id.to_string()));
            Ok(self.profiles.get(user_id).cloned())
        }

        async fn recent_message_by(
            &self,
            channel_id: &str,
            user_id: &str,
            _exclude_message_id: &str,
        ) -> Result<Option<String>, ChannelError> {
            if self.history_fails {
                return Err(ChannelError::PermissionDenied {
                    channel: channel_id.to_string(),
                });
            }
            Ok(self.recent.get(user_id).cloned())
        }
    }

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    pub(crate) fn profile(user_id: &str) -> MemberProfile {
        MemberProfile {
            user_id: user_id.into(),
            display_name: "Bob".into(),
            joined_at: Some(Utc.with_ymd_and_hms(2025, 2, 1, 18, 30, 0).unwrap()),
            account_created: now() - Duration::days(400),
            roles: vec!["Admin".into(), "OG".into(), "Holder".into(), "Member".into()],
        }
    }

    fn formatter() -> FixedOffsetFormatter {
        FixedOffsetFormatter::new(0, "%d %b %Y %H:%M")
    }

    #[test]
    fn renders_every_line() {
        let text = render_insight(&profile("42"), Some("  see you at the mint  "), &formatter(), now());
        assert_eq!(
            text,
            "Joined: 01 Feb 2025 18:30\nAccount age: 400 days\nTop roles: Admin, OG, Holder\nRecent: “see you at the mint”"
        );
    }

    #[test]
    fn optional_lines_are_omitted() {
        let mut bare = profile("42");
        bare.roles.clear();
        bare.joined_at = None;
        let text = render_insight(&bare, Some("   "), &formatter(), now());
        assert_eq!(text, "Joined: 19 Oct 2026 12:00\nAccount age: 400 days");
    }

    #[test]
    fn long_recent_message_is_cut() {
        let long = "x".repeat(300);
        let text = render_insight(&profile("42"), Some(&long), &formatter(), now());
        let recent = text.lines().last().unwrap();
        assert_eq!(recent.chars().count(), "Recent: “”".chars().count() + RECENT_SNIPPET_CHARS);
    }

    #[tokio::test]
    async fn about_me_looks_up_the_author() {
        let directory = MemberDirectory::default().with(profile("u1"));
        let msg = message("general", "what do you know about me");

        let text = describe_member(&directory, &msg, None, &formatter(), now()).await;
        assert!(text.starts_with("Joined: 01 Feb 2025"));
        assert_eq!(
            directory.lookups.lock().unwrap().clone(),
            vec![("g1".to_string(), "u1".to_string())]
        );
    }

    #[tokio::test]
    async fn mentioned_member_with_recent_message() {
        let mut directory = MemberDirectory::default().with(profile("42"));
        directory.recent.insert("42".into(), "gm frens".into());
        let msg = message("general", "tell me something about <@42>");

        let text = describe_member(&directory, &msg, Some("42"), &formatter(), now()).await;
        assert!(text.ends_with("Recent: “gm frens”"));
    }

    #[tokio::test]
    async fn unknown_member_gets_apology() {
        let directory = MemberDirectory::default();
        let msg = message("general", "tell me something about <@99>");
        let text = describe_member(&directory, &msg, Some("99"), &formatter(), now()).await;
        assert_eq!(text, MEMBER_NOT_FOUND);

        let mut dm = msg.clone();
        dm.guild_id = None;
        assert_eq!(describe_member(&directory, &dm, Some("99"), &formatter(), now()).await, MEMBER_NOT_FOUND);
    }

    #[tokio::test]
    async fn unreadable_history_still_describes_member() {
        let directory = MemberDirectory {
            history_fails: true,
            ..MemberDirectory::default()
        }
        .with(profile("42"));
        let msg = message("general", "tell me something about <@42>");
        let text = describe_member(&directory, &msg, Some("42"), &formatter(), now()).await;
        assert!(text.contains("Top roles: Admin, OG, Holder"));
        assert!(!text.contains("Recent:"));
    }
}
