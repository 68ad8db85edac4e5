pub mod ask;
pub mod onboard;
pub mod run;
pub mod search;
pub mod status;

use banter_config::BotConfig;
use banter_channels::DiscordChannel;
use banter_core::provider::Provider;
use banter_knowledge::{BuildOutcome, IndexConfig, KnowledgeIndex};
use std::sync::Arc;

pub(crate) fn load_config() -> Result<BotConfig, Box<dyn std::error::Error>> {
    let config = BotConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config.validate().map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

/// The provider stack, or `None` when no API key is configured.
pub(crate) fn provider(config: &BotConfig) -> Option<Arc<dyn Provider>> {
    match banter_providers::build_from_config(&config.provider) {
        Ok(provider) => Some(provider),
        Err(e) => {
            tracing::warn!(error = %e, "Model disabled, falling back to canned replies");
            None
        }
    }
}

/// Scan the configured knowledge channels into a fresh index.
pub(crate) async fn scan_knowledge(
    config: &BotConfig,
) -> Result<Arc<KnowledgeIndex>, Box<dyn std::error::Error>> {
    let index = Arc::new(KnowledgeIndex::new(IndexConfig::from_config(&config.knowledge)));
    let discord = DiscordChannel::from_config(&config.discord)?;

    eprint!("  Scanning history...");
    let outcome = index.rebuild(&discord).await;
    eprint!("\r                     \r");

    match outcome {
        BuildOutcome::Built { snapshot, sources_scanned, sources_skipped } => {
            eprintln!(
                "  Indexed {} messages from {} channels ({} skipped)",
                snapshot.len(),
                sources_scanned,
                sources_skipped
            );
        }
        BuildOutcome::NoSources => {
            eprintln!("  No knowledge channels configured; set [knowledge].channel_names");
        }
        BuildOutcome::AlreadyRunning => {}
    }
    Ok(index)
}
