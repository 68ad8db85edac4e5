//! Per-channel bookkeeping: last activity, last starter, last reply.
//!
//! Each channel is keyed independently. Plain updates are last-write-wins;
//! the check-and-set operations hold the map lock across both steps.

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Mutex;

/// Canned icebreakers used when the model is not asked for one.
pub const CANNED_STARTERS: &[&str] = &[
    "What's everyone working on today?",
    "Tea or coffee this afternoon? ☕",
    "What's one small win you had this week?",
    "Drop a tune you've had on repeat lately!",
    "What's your go-to productivity hack, then?",
];

/// Longest starter the bot will post.
pub const MAX_STARTER_CHARS: usize = 140;

/// When a quiet channel may receive a starter.
#[derive(Debug, Clone, Copy)]
pub struct StarterPolicy {
    pub idle: Duration,
    pub cooldown: Duration,
}

impl StarterPolicy {
    pub fn from_minutes(idle_minutes: u64, cooldown_minutes: u64) -> Self {
        Self {
            idle: Duration::minutes(idle_minutes as i64),
            cooldown: Duration::minutes(cooldown_minutes as i64),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ChannelActivity {
    last_message: Option<DateTime<Utc>>,
    last_starter: Option<DateTime<Utc>>,
    last_reply: Option<String>,
}

pub struct ActivityTracker {
    /// Channels never seen count as active from this instant
    started_at: DateTime<Utc>,
    channels: Mutex<HashMap<String, ChannelActivity>>,
}

impl ActivityTracker {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn with_channel<R>(&self, channel_id: &str, f: impl FnOnce(&mut ChannelActivity) -> R) -> R {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        f(channels.entry(channel_id.to_string()).or_default())
    }

    pub fn record_message(&self, channel_id: &str, at: DateTime<Utc>) {
        self.with_channel(channel_id, |a| a.last_message = Some(at));
    }

    /// Record `text` as the channel's last reply unless it already is.
    /// Returns false, leaving state untouched, for a verbatim repeat.
    pub fn record_reply_if_new(&self, channel_id: &str, text: &str) -> bool {
        self.with_channel(channel_id, |a| {
            if a.last_reply.as_deref() == Some(text) {
                return false;
            }
            a.last_reply = Some(text.to_string());
            true
        })
    }

    pub fn last_reply(&self, channel_id: &str) -> Option<String> {
        self.with_channel(channel_id, |a| a.last_reply.clone())
    }

    /// Claim the starter slot for a channel if it is idle and off cooldown.
    /// A successful claim starts the cooldown.
    pub fn claim_starter(&self, channel_id: &str, now: DateTime<Utc>, policy: &StarterPolicy) -> bool {
        let started_at = self.started_at;
        self.with_channel(channel_id, |a| {
            let last_message = a.last_message.unwrap_or(started_at);
            if now.signed_duration_since(last_message) < policy.idle {
                return false;
            }
            if let Some(last_starter) = a.last_starter {
                if now.signed_duration_since(last_starter) < policy.cooldown {
                    return false;
                }
            }
            a.last_starter = Some(now);
            true
        })
    }
}

/// A random canned opener.
pub fn canned_starter() -> &'static str {
    CANNED_STARTERS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("What's everyone up to?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn policy() -> StarterPolicy {
        StarterPolicy::from_minutes(25, 45)
    }

    #[test]
    fn fresh_channel_waits_for_idle_window() {
        let tracker = ActivityTracker::new(t0());
        assert!(!tracker.claim_starter("c1", t0() + Duration::minutes(10), &policy()));
        assert!(tracker.claim_starter("c1", t0() + Duration::minutes(25), &policy()));
    }

    #[test]
    fn recent_message_blocks_starter() {
        let tracker = ActivityTracker::new(t0());
        tracker.record_message("c1", t0() + Duration::minutes(30));
        assert!(!tracker.claim_starter("c1", t0() + Duration::minutes(40), &policy()));
        assert!(tracker.claim_starter("c1", t0() + Duration::minutes(55), &policy()));
    }

    #[test]
    fn cooldown_applies_after_starter() {
        let tracker = ActivityTracker::new(t0());
        let first = t0() + Duration::minutes(30);
        assert!(tracker.claim_starter("c1", first, &policy()));
        assert!(!tracker.claim_starter("c1", first + Duration::minutes(30), &policy()));
        assert!(tracker.claim_starter("c1", first + Duration::minutes(45), &policy()));
    }

    #[test]
    fn channels_are_independent() {
        let tracker = ActivityTracker::new(t0());
        tracker.record_message("busy", t0() + Duration::minutes(29));
        let now = t0() + Duration::minutes(30);
        assert!(tracker.claim_starter("quiet", now, &policy()));
        assert!(!tracker.claim_starter("busy", now, &policy()));
    }

    #[test]
    fn repeated_reply_is_refused() {
        let tracker = ActivityTracker::new(t0());
        assert!(tracker.last_reply("c1").is_none());
        assert!(tracker.record_reply_if_new("c1", "first"));
        assert!(!tracker.record_reply_if_new("c1", "first"));
        assert!(tracker.record_reply_if_new("c1", "second"));
        assert!(tracker.record_reply_if_new("c1", "first"));
        assert_eq!(tracker.last_reply("c1").as_deref(), Some("first"));
        assert!(tracker.record_reply_if_new("c2", "first"));
    }

    #[test]
    fn concurrent_identical_replies_record_once() {
        let tracker = ActivityTracker::new(t0());
        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| tracker.record_reply_if_new("c1", "same")))
                .collect();
            handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
        });
        assert_eq!(accepted, 1);
    }

    #[test]
    fn canned_starter_is_short() {
        for _ in 0..20 {
            let starter = canned_starter();
            assert!(CANNED_STARTERS.contains(&starter));
            assert!(starter.chars().count() <= MAX_STARTER_CHARS);
        }
    }
}
