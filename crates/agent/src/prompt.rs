//! Prompt assembly for chat replies and idle starters.

use banter_core::message::Message;

use crate::budget::{PromptSet, PromptSlot};

/// Separates the question from retrieved notes in the content message.
pub const NOTES_MARKER: &str = "Knowledge:\n";

/// Stands in for notes removed by the budgeter.
pub const NOTES_PLACEHOLDER: &str = "(notes trimmed)";

/// Instruction used when the model writes an idle starter.
pub const STARTER_INSTRUCTION: &str =
    "Write one upbeat icebreaker for a Discord server. No hashtags. Keep it under 20 words.";

/// Builds prompt sets from the persona and locale.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    language: String,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            language: language.into(),
        }
    }

    /// Persona, question with optional notes, and the reply directive.
    pub fn reply(&self, user_text: &str, snippets: &[String]) -> PromptSet {
        let mut content = format!("User said: \"{}\"", user_text.trim());
        if !snippets.is_empty() {
            content.push_str("\n\n");
            content.push_str(NOTES_MARKER);
            content.push_str("- ");
            content.push_str(&snippets.join("\n- "));
        }

        PromptSet::new()
            .with(PromptSlot::System, Message::system(&self.persona))
            .with(PromptSlot::Content, Message::user(content))
            .with(PromptSlot::Auxiliary, Message::system(self.directive()))
    }

    pub fn starter(&self) -> PromptSet {
        PromptSet::new()
            .with(PromptSlot::System, Message::system(&self.persona))
            .with(PromptSlot::Content, Message::user(STARTER_INSTRUCTION))
            .with(PromptSlot::Auxiliary, Message::system(self.directive()))
    }

    fn directive(&self) -> String {
        format!(
            "Keep replies concise. Never mention @here or @everyone. Language: {}.",
            self.language
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::message::Role;

    fn builder() -> PromptBuilder {
        PromptBuilder::new("You are a cheeky, kind Discord regular.", "en-GB")
    }

    #[test]
    fn reply_without_notes() {
        let prompt = builder().reply("  gm all  ", &[]);
        assert_eq!(prompt.len(), 3);

        let entries = prompt.entries();
        assert_eq!(entries[0].slot, PromptSlot::System);
        assert_eq!(entries[1].message.content, "User said: \"gm all\"");
        assert_eq!(entries[1].message.role, Role::User);
        assert!(entries[2].message.content.contains("Language: en-GB."));
        assert!(!entries[1].message.content.contains(NOTES_MARKER));
    }

    #[test]
    fn reply_with_notes_block() {
        let snippets = vec![
            "[#faq] 18 Oct 2026 16:00 — mint opens Friday".to_string(),
            "[#news] 19 Oct 2026 10:00 — WL first".to_string(),
        ];
        let prompt = builder().reply("when is mint?", &snippets);
        let content = &prompt.first(PromptSlot::Content).unwrap().content;
        assert_eq!(
            content,
            "User said: \"when is mint?\"\n\nKnowledge:\n- [#faq] 18 Oct 2026 16:00 — mint opens Friday\n- [#news] 19 Oct 2026 10:00 — WL first"
        );
    }

    #[test]
    fn starter_prompt_uses_instruction() {
        let prompt = builder().starter();
        assert_eq!(prompt.first(PromptSlot::Content).unwrap().content, STARTER_INSTRUCTION);
        assert_eq!(prompt.into_messages()[0].role, Role::System);
    }
}
