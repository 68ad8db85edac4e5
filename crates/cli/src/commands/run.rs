//! `banter run`: Connect to Discord and chat.

use banter_agent::BotRuntime;
use banter_channels::DiscordChannel;
use banter_core::channel::Channel;
use banter_core::history::HistorySource;
use banter_core::member::MemberSource;
use std::sync::Arc;
use tracing::info;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let discord = Arc::new(DiscordChannel::from_config(&config.discord)?);
    let provider = super::provider(&config);

    info!(
        model = %config.provider.model,
        fallback = ?config.provider.model_fallback,
        knowledge_channels = config.knowledge.channel_names.len() + config.knowledge.channel_ids.len(),
        allowlist = ?config.discord.channel_allowlist,
        timezone = %config.locale.timezone,
        "Starting Banter"
    );

    let channel: Arc<dyn Channel> = discord.clone();
    let history: Arc<dyn HistorySource> = discord.clone();
    let members: Arc<dyn MemberSource> = discord.clone();
    let runtime = Arc::new(BotRuntime::with_members(&config, channel, history, provider, members));

    tokio::select! {
        result = runtime.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            discord.stop().await?;
        }
    }

    Ok(())
}
