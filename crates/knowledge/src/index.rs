//! The knowledge index: versioned, immutable snapshots of channel history.
//!
//! A build pages every selected channel backwards into a private buffer,
//! sorts it newest-first and then swaps it in as the new snapshot. Readers
//! clone the current `Arc<IndexSnapshot>` and keep using it for the whole
//! query, so they observe either the old or the new document set, never a
//! mixture. Only one build runs at a time; a trigger that arrives while a
//! build is in flight is ignored.

use banter_config::KnowledgeConfig;
use banter_core::error::ChannelError;
use banter_core::history::{HistoryChannel, HistorySource, MAX_BATCH_SIZE};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::document::{Document, IndexedDocument};

/// Tunables for index builds.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Channel IDs to scan; take precedence over names
    pub channel_ids: Vec<String>,
    /// Channel names to scan when no ID resolves
    pub channel_names: Vec<String>,
    /// Maximum documents admitted from a single channel
    pub per_source_cap: usize,
    /// Maximum documents admitted across all channels
    pub global_budget: usize,
    /// Content is cut to this many characters at ingestion
    pub max_content_chars: usize,
}

impl IndexConfig {
    pub fn from_config(config: &KnowledgeConfig) -> Self {
        Self {
            channel_ids: config.channel_ids.clone(),
            channel_names: config.channel_names.clone(),
            per_source_cap: config.max_messages_per_channel,
            global_budget: config.max_total_messages,
            max_content_chars: config.max_content_chars,
        }
    }

    fn has_sources(&self) -> bool {
        !self.channel_ids.is_empty() || !self.channel_names.is_empty()
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::from_config(&KnowledgeConfig::default())
    }
}

/// One committed, immutable index state.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    /// 0 for the initial empty snapshot, +1 per committed build
    pub version: u64,
    /// When the build that produced this snapshot finished
    pub built_at: Option<DateTime<Utc>>,
    documents: Vec<IndexedDocument>,
}

impl IndexSnapshot {
    /// Build a snapshot from already-ingested documents, sorting newest first.
    pub fn from_documents(version: u64, documents: Vec<Document>) -> Self {
        let mut indexed: Vec<IndexedDocument> =
            documents.into_iter().map(IndexedDocument::new).collect();
        sort_newest_first(&mut indexed);
        Self {
            version,
            built_at: Some(Utc::now()),
            documents: indexed,
        }
    }

    /// Documents ordered by non-increasing timestamp.
    pub fn documents(&self) -> &[IndexedDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn sort_newest_first(documents: &mut [IndexedDocument]) {
    // Stable: equal timestamps keep page order.
    documents.sort_by(|a, b| b.document.timestamp.cmp(&a.document.timestamp));
}

/// Result of a build request.
#[derive(Debug)]
pub enum BuildOutcome {
    /// A new snapshot was committed.
    Built {
        snapshot: Arc<IndexSnapshot>,
        sources_scanned: usize,
        sources_skipped: usize,
    },
    /// Nothing to scan; the previous snapshot is untouched.
    NoSources,
    /// Another build holds the writer slot; this trigger was dropped.
    AlreadyRunning,
}

/// Pick the channels to index from everything the source can see.
///
/// Explicit IDs win. Names are only consulted when no ID resolves to a text
/// channel. Non-text channels are never selected.
pub fn select_sources(
    candidates: &[HistoryChannel],
    ids: &[String],
    names: &[String],
) -> Vec<HistoryChannel> {
    let by_id: Vec<HistoryChannel> = ids
        .iter()
        .filter_map(|id| candidates.iter().find(|c| c.is_text && &c.id == id))
        .cloned()
        .collect();
    if !by_id.is_empty() {
        return by_id;
    }

    candidates
        .iter()
        .filter(|c| c.is_text && names.iter().any(|n| n == &c.name))
        .cloned()
        .collect()
}

/// The shared knowledge index.
pub struct KnowledgeIndex {
    config: IndexConfig,
    current: RwLock<Arc<IndexSnapshot>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl KnowledgeIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// The latest committed snapshot.
    pub fn current_snapshot(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Enumerate the source's channels, select the configured ones and build.
    pub async fn rebuild(&self, source: &dyn HistorySource) -> BuildOutcome {
        if !self.config.has_sources() {
            info!("No knowledge channels configured, skipping index build");
            return BuildOutcome::NoSources;
        }

        let candidates = match source.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Could not enumerate channels, keeping current index");
                return BuildOutcome::NoSources;
            }
        };

        let selected = select_sources(
            &candidates,
            &self.config.channel_ids,
            &self.config.channel_names,
        );
        info!(
            candidates = candidates.len(),
            selected = selected.len(),
            "Knowledge sources resolved"
        );

        self.build(source, &selected).await
    }

    /// Scan `channels` and replace the whole document collection.
    pub async fn build(&self, source: &dyn HistorySource, channels: &[HistoryChannel]) -> BuildOutcome {
        if channels.is_empty() {
            info!("No knowledge sources to scan, skipping index build");
            return BuildOutcome::NoSources;
        }

        let Ok(_writer) = self.build_lock.try_lock() else {
            info!("Index build already in progress, ignoring trigger");
            return BuildOutcome::AlreadyRunning;
        };

        let mut buffer: Vec<IndexedDocument> = Vec::new();
        let mut scanned = 0;
        let mut skipped = 0;

        for channel in channels {
            let remaining = self.config.global_budget.saturating_sub(buffer.len());
            if remaining == 0 {
                info!(channel = %channel, "Global knowledge budget exhausted, stopping build");
                break;
            }

            if !channel.is_text {
                debug!(channel = %channel, "Not a text channel, skipping");
                skipped += 1;
                continue;
            }

            if !source.can_read(channel).await {
                warn!(channel = %channel, "No read access to knowledge channel, skipping");
                skipped += 1;
                continue;
            }

            let cap = self.config.per_source_cap.min(remaining);
            match self.scan_channel(source, channel, cap).await {
                Ok((docs, fetched)) => {
                    info!(
                        channel = %channel,
                        fetched,
                        indexed = docs.len(),
                        "Knowledge channel scanned"
                    );
                    buffer.extend(docs);
                    scanned += 1;
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Knowledge channel unavailable, skipping");
                    skipped += 1;
                }
            }
        }

        let snapshot = self.commit(buffer);

        info!(
            version = snapshot.version,
            documents = snapshot.len(),
            scanned,
            skipped,
            "Knowledge index committed"
        );

        BuildOutcome::Built {
            snapshot,
            sources_scanned: scanned,
            sources_skipped: skipped,
        }
    }

    /// Commit documents gathered elsewhere as the next snapshot.
    pub fn install(&self, documents: Vec<Document>) -> Arc<IndexSnapshot> {
        self.commit(documents.into_iter().map(IndexedDocument::new).collect())
    }

    fn commit(&self, mut documents: Vec<IndexedDocument>) -> Arc<IndexSnapshot> {
        sort_newest_first(&mut documents);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = Arc::new(IndexSnapshot {
            version: current.version + 1,
            built_at: Some(Utc::now()),
            documents,
        });
        *current = snapshot.clone();
        snapshot
    }

    /// Page one channel backwards until `cap` documents are admitted or the
    /// history runs out. Returns the documents and the raw message count.
    async fn scan_channel(
        &self,
        source: &dyn HistorySource,
        channel: &HistoryChannel,
        cap: usize,
    ) -> Result<(Vec<IndexedDocument>, usize), ChannelError> {
        let mut docs = Vec::new();
        let mut fetched = 0;
        let mut before: Option<String> = None;

        while docs.len() < cap {
            let wanted = (cap - docs.len()).min(MAX_BATCH_SIZE as usize) as u8;
            let batch = source.fetch_batch(channel, before.as_deref(), wanted).await?;
            if batch.is_empty() {
                break;
            }
            fetched += batch.len();

            for message in &batch {
                if docs.len() >= cap {
                    break;
                }
                if let Some(doc) = Document::from_history(channel, message, self.config.max_content_chars) {
                    docs.push(IndexedDocument::new(doc));
                }
            }

            let oldest = batch.last().map(|m| m.id.clone());
            if batch.len() < wanted as usize || oldest == before {
                break;
            }
            before = oldest;
        }

        debug!(channel = %channel, fetched, admitted = docs.len(), "Pagination finished");
        Ok((docs, fetched))
    }
}
