//! The Banter conversational layer.
//!
//! For each chat message the bot follows a **Gate → Ground → Budget →
//! Generate** cycle:
//!
//! 1. **Gate** the message (allowlist, mentions, intent, reply chance)
//! 2. **Ground** it with snippets from the knowledge index
//! 3. **Budget** the assembled prompt to the input token ceiling
//! 4. **Generate** through the provider stack and post the sanitized reply
//!
//! Profile questions ("about me") are answered from the member directory
//! instead of the model. Quiet channels get an occasional icebreaker and
//! the index is rebuilt on a timer.

pub mod activity;
pub mod bot;
pub mod budget;
pub mod insight;
pub mod intent;
pub mod prompt;
pub mod responder;

pub use activity::{ActivityTracker, StarterPolicy};
pub use bot::BotRuntime;
pub use budget::{
    BudgetPolicy, BudgetReport, ContextBudgeter, PromptEntry, PromptSet, PromptSlot, estimate_tokens,
};
pub use insight::{MEMBER_NOT_FOUND, describe_member, render_insight};
pub use intent::{Intent, is_question_like};
pub use prompt::PromptBuilder;
pub use responder::{FALLBACK_REPLY, Gate, IgnoreReason, Reply, Responder, sanitize_reply};
