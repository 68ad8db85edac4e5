//! Text normalization for lexical matching.
//!
//! Lower-cases, removes raw URLs, and replaces every character that is not
//! a Unicode letter, digit or whitespace (markdown control characters,
//! punctuation, emoji) with a space before splitting on whitespace.

use regex::Regex;
use std::sync::LazyLock;

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("URL pattern is valid")
});

/// Split `text` into normalized tokens. Pure; never fails.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lowered = text.to_lowercase();
    let without_urls = URL.replace_all(&lowered, " ");

    let cleaned: String = without_urls
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits() {
        assert_eq!(tokenize("When does the Mint open"), vec!["when", "does", "the", "mint", "open"]);
    }

    #[test]
    fn strips_markdown_and_punctuation() {
        assert_eq!(
            tokenize("**Mint** `date` is ~~Friday~~ | <soon> _maybe_!"),
            vec!["mint", "date", "is", "friday", "soon", "maybe"]
        );
    }

    #[test]
    fn strips_urls() {
        assert_eq!(
            tokenize("see https://example.com/mint?x=1 and www.foo.io/bar now"),
            vec!["see", "and", "now"]
        );
    }

    #[test]
    fn keeps_unicode_letters_and_digits() {
        assert_eq!(tokenize("Café 2024 ÜBER naïve"), vec!["café", "2024", "über", "naïve"]);
        assert_eq!(tokenize("ミント 日付"), vec!["ミント", "日付"]);
    }

    #[test]
    fn joined_words_split_on_punctuation() {
        assert_eq!(tokenize("mint/date,wl-spots"), vec!["mint", "date", "wl", "spots"]);
    }

    #[test]
    fn empty_and_symbol_only_inputs() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n\t ").is_empty());
        assert!(tokenize("🔥🔥 ?!? ...").is_empty());
    }

    #[test]
    fn retokenizing_is_stable() {
        let samples = [
            "Hello, World! https://x.y/z",
            "  **Bold**  and __under__ score_words ",
            "Ünïcödé ÇAFÉ 42nd",
            "İstanbul straße ΣΊΣΥΦΟΣ",
            "🙂 emoji-only? no: text too",
            "",
        ];
        for sample in samples {
            let once = tokenize(sample);
            let twice = tokenize(&once.join(" "));
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn deterministic() {
        let text = "Same input, same tokens — every time.";
        assert_eq!(tokenize(text), tokenize(text));
    }
}
