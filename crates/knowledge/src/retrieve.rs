//! Lexical retrieval over one index snapshot.
//!
//! `score = |distinct query tokens ∩ document tokens| + bonus`, where the
//! bonus is a flat constant for documents younger than the recency window.
//! Overlap dominates; recency only separates equal overlaps. Candidates
//! under the threshold are dropped, the rest ranked by a stable descending
//! sort (ties stay newest-first, the snapshot order), cut to `k`, rendered
//! as snippets and packed greedily into the total character budget.

use banter_config::KnowledgeConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::document::IndexedDocument;
use crate::format::{FixedOffsetFormatter, TimestampFormatter};
use crate::index::IndexSnapshot;
use crate::tokenize::tokenize;

/// Scoring tunables.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub recency_window: Duration,
    pub recency_bonus: f32,
}

impl RetrievalConfig {
    pub fn from_config(config: &KnowledgeConfig) -> Self {
        Self {
            recency_window: Duration::hours(config.recency_window_hours as i64),
            recency_bonus: config.recency_bonus,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::from_config(&KnowledgeConfig::default())
    }
}

/// One retrieval request.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    /// Maximum snippets returned
    pub k: usize,
    /// Candidates scoring below this are never surfaced
    pub min_score: f32,
    /// Per-snippet limit, header included
    pub snippet_char_limit: usize,
    /// Limit on the summed length of all snippets
    pub total_char_limit: usize,
}

impl RetrievalQuery {
    pub fn from_config(text: impl Into<String>, config: &KnowledgeConfig) -> Self {
        Self {
            text: text.into(),
            k: config.max_snippets,
            min_score: config.min_score,
            snippet_char_limit: config.snippet_chars,
            total_char_limit: config.total_chars,
        }
    }
}

/// A document paired with its score for the current query.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub document: &'a IndexedDocument,
    pub score: f32,
}

/// Scores, ranks and renders snippets.
pub struct Retriever {
    config: RetrievalConfig,
    formatter: Arc<dyn TimestampFormatter>,
}

impl Retriever {
    pub fn new(config: RetrievalConfig, formatter: Arc<dyn TimestampFormatter>) -> Self {
        Self { config, formatter }
    }

    /// Retriever with UTC timestamps and default scoring.
    pub fn with_defaults() -> Self {
        Self::new(RetrievalConfig::default(), Arc::new(FixedOffsetFormatter::default()))
    }

    /// Score of one document against a distinct query token set.
    pub fn score(&self, document: &IndexedDocument, query_tokens: &HashSet<String>, now: DateTime<Utc>) -> f32 {
        let overlap = query_tokens
            .iter()
            .filter(|t| document.tokens.contains(*t))
            .count() as f32;

        let age = now.signed_duration_since(document.document.timestamp);
        let bonus = if age <= self.config.recency_window {
            self.config.recency_bonus
        } else {
            0.0
        };

        overlap + bonus
    }

    /// Candidates clearing `min_score`, best first, at most `k`.
    pub fn rank<'a>(
        &self,
        snapshot: &'a IndexSnapshot,
        query: &RetrievalQuery,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate<'a>> {
        let query_tokens: HashSet<String> = tokenize(&query.text).into_iter().collect();
        if snapshot.is_empty() || query_tokens.is_empty() || query.k == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<ScoredCandidate<'a>> = snapshot
            .documents()
            .iter()
            .map(|document| ScoredCandidate {
                document,
                score: self.score(document, &query_tokens, now),
            })
            .filter(|c| c.score >= query.min_score)
            .collect();

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(query.k);
        candidates
    }

    /// Formatted snippets for `query`, packed into its character budget.
    /// Empty means no grounding is available.
    pub fn retrieve(&self, snapshot: &IndexSnapshot, query: &RetrievalQuery, now: DateTime<Utc>) -> Vec<String> {
        let ranked = self.rank(snapshot, query, now);
        let per_snippet = query.snippet_char_limit.min(query.total_char_limit);

        let mut snippets = Vec::new();
        let mut used = 0;
        for candidate in &ranked {
            let full = self.render(candidate.document);
            let (snippet, len) = truncate_chars(&full, per_snippet);
            if len == 0 || used + len > query.total_char_limit {
                break;
            }
            used += len;
            snippets.push(snippet);
        }

        debug!(
            version = snapshot.version,
            candidates = ranked.len(),
            returned = snippets.len(),
            chars = used,
            "Knowledge retrieval finished"
        );
        snippets
    }

    fn render(&self, document: &IndexedDocument) -> String {
        let doc = &document.document;
        format!(
            "[#{}] {} — {}",
            doc.channel_name,
            self.formatter.format(&doc.timestamp),
            doc.content
        )
    }
}

/// Cut `text` to at most `limit` characters, marking a cut with `…`.
/// Returns the text and its character count.
fn truncate_chars(text: &str, limit: usize) -> (String, usize) {
    let len = text.chars().count();
    if len <= limit {
        return (text.to_string(), len);
    }
    if limit == 0 {
        return (String::new(), 0);
    }
    let mut cut: String = text.chars().take(limit - 1).collect();
    cut.push('…');
    (cut, limit)
}
