//! Knowledge base for grounded replies.
//!
//! Scrapes channel history into an in-memory index, scores documents
//! against a question by token overlap plus a recency nudge, and renders
//! the winners as length-bounded snippets for a model prompt.
//!
//! # Flow
//!
//! 1. [`select_sources`] picks the channels to scan
//! 2. [`KnowledgeIndex::build`] pages their history into a new snapshot
//! 3. [`Retriever::retrieve`] ranks one snapshot against a query

pub mod document;
pub mod format;
pub mod index;
pub mod retrieve;
pub mod tokenize;

pub use document::{Document, IndexedDocument};
pub use format::{FixedOffsetFormatter, TimestampFormatter, ZonedFormatter, formatter_from_locale};
pub use index::{BuildOutcome, IndexConfig, IndexSnapshot, KnowledgeIndex, select_sources};
pub use retrieve::{RetrievalConfig, RetrievalQuery, Retriever, ScoredCandidate};
pub use tokenize::tokenize;
