//! Context budgeter: trims a prompt to an approximate token ceiling.
//!
//! Tokens are estimated with a character heuristic: 1 token ≈ 4 characters,
//! rounded up per message. While the prompt is over budget, the largest
//! trimmable message of the highest-priority slot loses a chunk of trailing
//! characters:
//!
//! | Priority | Slot | Holds |
//! |----------|------|-------|
//! | 1 | Content | question + retrieved notes |
//! | 2 | Auxiliary | short per-call directives |
//! | 3 | System | persona |
//!
//! If the iteration cap is reached while still over budget, everything after
//! the notes marker in the first content message collapses to a placeholder.
//! Budgeting never fails; an over-budget result is reported, not raised.

use banter_config::{BudgetConfig, ProviderConfig};
use banter_core::message::Message;
use serde::Serialize;
use tracing::{debug, warn};

use crate::prompt::{NOTES_MARKER, NOTES_PLACEHOLDER};

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// Where a message sits in the trim order. Declaration order is priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PromptSlot {
    Content,
    Auxiliary,
    System,
}

impl PromptSlot {
    const TRIM_ORDER: [PromptSlot; 3] = [Self::Content, Self::Auxiliary, Self::System];
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptEntry {
    pub slot: PromptSlot,
    pub message: Message,
}

/// Ordered, slot-tagged prompt messages. Mutated only by the budgeter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSet {
    entries: Vec<PromptEntry>,
}

impl PromptSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: PromptSlot, message: Message) {
        self.entries.push(PromptEntry { slot, message });
    }

    pub fn with(mut self, slot: PromptSlot, message: Message) -> Self {
        self.push(slot, message);
        self
    }

    pub fn entries(&self) -> &[PromptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First message in `slot`, if any.
    pub fn first(&self, slot: PromptSlot) -> Option<&Message> {
        self.entries
            .iter()
            .find(|e| e.slot == slot)
            .map(|e| &e.message)
    }

    pub fn approx_tokens(&self) -> usize {
        self.entries
            .iter()
            .map(|e| estimate_tokens(&e.message.content))
            .sum()
    }

    /// Messages in send order.
    pub fn into_messages(self) -> Vec<Message> {
        self.entries.into_iter().map(|e| e.message).collect()
    }
}

/// Budgeting limits.
#[derive(Debug, Clone)]
pub struct BudgetPolicy {
    pub max_input_tokens: usize,
    /// Characters removed per trim step
    pub chunk_chars: usize,
    /// Messages are never trimmed below this length
    pub floor_chars: usize,
    pub max_iterations: usize,
}

impl BudgetPolicy {
    pub fn from_config(provider: &ProviderConfig, budget: &BudgetConfig) -> Self {
        Self {
            max_input_tokens: provider.max_input_tokens,
            chunk_chars: budget.chunk_chars.max(1),
            floor_chars: budget.floor_chars,
            max_iterations: budget.max_iterations,
        }
    }
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default(), &BudgetConfig::default())
    }
}

/// What one budgeting pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetReport {
    pub before_tokens: usize,
    pub after_tokens: usize,
    pub chars_trimmed: usize,
    pub iterations: usize,
    pub notes_collapsed: bool,
    pub within_budget: bool,
}

pub struct ContextBudgeter {
    policy: BudgetPolicy,
}

impl ContextBudgeter {
    pub fn new(policy: BudgetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Shrink `prompt` in place until it fits, or until nothing more can go.
    pub fn budget(&self, prompt: &mut PromptSet) -> BudgetReport {
        let limit = self.policy.max_input_tokens;
        let before_tokens = prompt.approx_tokens();
        let mut tokens = before_tokens;
        let mut chars_trimmed = 0;
        let mut iterations = 0;

        while tokens > limit && iterations < self.policy.max_iterations {
            let Some(index) = self.pick_victim(prompt) else {
                break;
            };
            let message = &mut prompt.entries[index].message;
            let len = message.char_len();
            let cut = self.policy.chunk_chars.min(len - self.policy.floor_chars);
            truncate_to_chars(&mut message.content, len - cut);

            chars_trimmed += cut;
            iterations += 1;
            tokens = prompt.approx_tokens();
        }

        let mut notes_collapsed = false;
        if tokens > limit {
            notes_collapsed = collapse_notes(prompt);
            if notes_collapsed {
                tokens = prompt.approx_tokens();
            }
        }

        let report = BudgetReport {
            before_tokens,
            after_tokens: tokens,
            chars_trimmed,
            iterations,
            notes_collapsed,
            within_budget: tokens <= limit,
        };

        if report.within_budget {
            debug!(
                before = report.before_tokens,
                after = report.after_tokens,
                limit,
                trimmed = report.chars_trimmed,
                "Prompt budgeted"
            );
        } else {
            warn!(
                before = report.before_tokens,
                after = report.after_tokens,
                limit,
                "Prompt still over budget after trimming"
            );
        }
        report
    }

    /// Largest message above the floor in the highest-priority slot that has one.
    fn pick_victim(&self, prompt: &PromptSet) -> Option<usize> {
        let floor = self.policy.floor_chars;
        PromptSlot::TRIM_ORDER.iter().find_map(|slot| {
            prompt
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.slot == *slot && e.message.char_len() > floor)
                // max_by_key keeps the last maximum; reverse so the earliest wins ties.
                .rev()
                .max_by_key(|(_, e)| e.message.char_len())
                .map(|(i, _)| i)
        })
    }
}

fn truncate_to_chars(text: &mut String, keep: usize) {
    if let Some((byte_index, _)) = text.char_indices().nth(keep) {
        text.truncate(byte_index);
    }
}

/// Replace everything after the notes marker in the first content message.
fn collapse_notes(prompt: &mut PromptSet) -> bool {
    let Some(entry) = prompt
        .entries
        .iter_mut()
        .find(|e| e.slot == PromptSlot::Content)
    else {
        return false;
    };

    let content = &mut entry.message.content;
    let Some(start) = content.find(NOTES_MARKER) else {
        return false;
    };
    let keep = start + NOTES_MARKER.len();
    if content[keep..].chars().count() <= NOTES_PLACEHOLDER.chars().count() {
        return false;
    }
    content.truncate(keep);
    content.push_str(NOTES_PLACEHOLDER);
    true
}
