//! Discord channel adapter.
//!
//! Live messages arrive over the serenity gateway client; replies, starters,
//! history pages and member lookups go through the REST client, which is
//! usable before the gateway connects.

use async_trait::async_trait;
use banter_config::DiscordConfig;
use banter_core::channel::{Channel, ChannelKind, IncomingMessage};
use banter_core::error::ChannelError;
use banter_core::history::{HistoryChannel, HistoryMessage, HistorySource, MAX_BATCH_SIZE};
use banter_core::member::{MemberProfile, MemberSource, RECENT_SCAN_LIMIT};
use chrono::{DateTime, Utc};
use serenity::all::{
    Channel as GatewayChannel, ChannelId, ChannelType, Client, Context, CreateAllowedMentions, CreateMessage,
    EventHandler, GatewayIntents, GetMessages, GuildId, Http, Message, MessageId, Ready, ShardManager,
    Timestamp, UserId,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Events the bot subscribes to. MESSAGE_CONTENT is privileged and must be
/// enabled in the Discord Developer Portal.
fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

pub struct DiscordChannel {
    token: String,
    http: Arc<Http>,
    shards: Mutex<Option<Arc<ShardManager>>>,
}

impl std::fmt::Debug for DiscordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordChannel")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl DiscordChannel {
    pub fn new(token: impl Into<String>) -> Result<Self, ChannelError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("Discord bot token is empty".into()));
        }
        let http = Arc::new(Http::new(&token));
        Ok(Self {
            token,
            http,
            shards: Mutex::new(None),
        })
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self, ChannelError> {
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured("Set DISCORD_TOKEN or [discord].token".into()))?;
        Self::new(token)
    }
}

/// Parse a Discord snowflake. Zero is rejected since serenity ids are non-zero.
pub fn parse_snowflake(id: &str) -> Option<u64> {
    id.trim().parse::<u64>().ok().filter(|n| *n != 0)
}

fn channel_id(id: &str) -> Result<ChannelId, ChannelError> {
    parse_snowflake(id)
        .map(ChannelId::new)
        .ok_or_else(|| ChannelError::NotConfigured(format!("Invalid channel id: {id}")))
}

pub fn to_utc(timestamp: &Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// Plain text channels are answered; threads carry their member count.
pub fn channel_kind(kind: ChannelType, member_count: Option<u32>) -> ChannelKind {
    match kind {
        ChannelType::Text => ChannelKind::Text,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread => {
            ChannelKind::Thread {
                member_count: member_count.unwrap_or(0),
            }
        }
        _ => ChannelKind::Other,
    }
}

/// Role names by descending position, `@everyone` dropped.
fn rank_roles<'a>(roles: impl IntoIterator<Item = (&'a str, u16)>) -> Vec<String> {
    let mut held: Vec<(&str, u16)> = roles.into_iter().filter(|(name, _)| *name != "@everyone").collect();
    held.sort_by(|a, b| b.1.cmp(&a.1));
    held.into_iter().map(|(name, _)| name.to_string()).collect()
}

fn to_history(message: &Message) -> HistoryMessage {
    HistoryMessage {
        id: message.id.to_string(),
        author: message.author.display_name().to_string(),
        author_is_bot: message.author.bot,
        content: message.content.clone(),
        timestamp: to_utc(&message.timestamp),
    }
}

struct Handler {
    tx: mpsc::Sender<Result<IncomingMessage, ChannelError>>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Connected to Discord");
    }

    async fn message(&self, ctx: Context, message: Message) {
        let (channel_name, channel_kind) = match message.channel(&ctx).await {
            Ok(GatewayChannel::Guild(channel)) => {
                let kind = channel_kind(channel.kind, channel.member_count.map(u32::from));
                (channel.name, kind)
            }
            Ok(_) => (message.channel_id.to_string(), ChannelKind::Other),
            Err(e) => {
                debug!(channel = %message.channel_id, error = %e, "Channel lookup failed");
                (message.channel_id.to_string(), ChannelKind::Other)
            }
        };

        let incoming = IncomingMessage {
            message_id: message.id.to_string(),
            guild_id: message.guild_id.map(|g| g.to_string()),
            channel_id: message.channel_id.to_string(),
            channel_name,
            channel_kind,
            author_id: message.author.id.to_string(),
            author_name: message.author.display_name().to_string(),
            author_is_bot: message.author.bot,
            content: message.content.clone(),
            mentions: message.mentions.iter().map(|u| u.id.to_string()).collect(),
            timestamp: to_utc(&message.timestamp),
        };

        if self.tx.send(Ok(incoming)).await.is_err() {
            debug!("Receiver dropped, discarding gateway message");
        }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<IncomingMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(256);

        let mut client = Client::builder(&self.token, intents())
            .event_handler(Handler { tx: tx.clone() })
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        *self.shards.lock().await = Some(client.shard_manager.clone());

        info!("Starting Discord gateway");
        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!(error = %e, "Discord gateway stopped");
                let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
            }
        });

        Ok(rx)
    }

    async fn send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        let channel = self::channel_id(channel_id)?;

        let mut builder = CreateMessage::new()
            .content(content)
            .allowed_mentions(CreateAllowedMentions::new().replied_user(true));
        if let Some(id) = reply_to.and_then(parse_snowflake) {
            builder = builder.reference_message((channel, MessageId::new(id)));
        }

        channel
            .send_message(&self.http, builder)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: channel_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        if let Some(shards) = self.shards.lock().await.take() {
            info!("Discord channel stopping");
            shards.shutdown_all().await;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        Ok(self.http.get_current_user().await.is_ok())
    }
}

#[async_trait]
impl HistorySource for DiscordChannel {
    async fn list_channels(&self) -> Result<Vec<HistoryChannel>, ChannelError> {
        let guilds = self
            .http
            .get_guilds(None, None)
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let mut channels = Vec::new();
        for guild in guilds {
            match guild.id.channels(&self.http).await {
                Ok(found) => channels.extend(found.into_values().map(|c| HistoryChannel {
                    id: c.id.to_string(),
                    name: c.name,
                    is_text: c.kind == ChannelType::Text,
                })),
                Err(e) => warn!(guild = %guild.name, error = %e, "Could not list guild channels"),
            }
        }
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    async fn can_read(&self, channel: &HistoryChannel) -> bool {
        let Ok(id) = self::channel_id(&channel.id) else {
            return false;
        };
        id.messages(&self.http, GetMessages::new().limit(1)).await.is_ok()
    }

    async fn fetch_batch(
        &self,
        channel: &HistoryChannel,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, ChannelError> {
        let id = self::channel_id(&channel.id)?;

        let mut request = GetMessages::new().limit(limit.clamp(1, MAX_BATCH_SIZE));
        if let Some(cursor) = before.and_then(parse_snowflake) {
            request = request.before(MessageId::new(cursor));
        }

        let page = id
            .messages(&self.http, request)
            .await
            .map_err(|e| ChannelError::FetchFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        Ok(page.iter().map(to_history).collect())
    }
}

#[async_trait]
impl MemberSource for DiscordChannel {
    async fn member_profile(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberProfile>, ChannelError> {
        let (Some(guild), Some(user)) = (parse_snowflake(guild_id), parse_snowflake(user_id)) else {
            return Ok(None);
        };
        let guild = GuildId::new(guild);

        let member = match self.http.get_member(guild, UserId::new(user)).await {
            Ok(member) => member,
            Err(e) => {
                debug!(guild = %guild, user = %user_id, error = %e, "Member fetch failed");
                return Ok(None);
            }
        };
        let roles = self
            .http
            .get_guild_roles(guild)
            .await
            .map_err(|e| ChannelError::FetchFailed {
                channel: format!("guild {guild} roles"),
                reason: e.to_string(),
            })?;

        let held = roles
            .iter()
            .filter(|role| member.roles.contains(&role.id))
            .map(|role| (role.name.as_str(), role.position));

        Ok(Some(MemberProfile {
            user_id: member.user.id.to_string(),
            display_name: member.display_name().to_string(),
            joined_at: member.joined_at.as_ref().map(to_utc),
            account_created: to_utc(&member.user.id.created_at()),
            roles: rank_roles(held),
        }))
    }

    async fn recent_message_by(
        &self,
        channel_id: &str,
        user_id: &str,
        exclude_message_id: &str,
    ) -> Result<Option<String>, ChannelError> {
        let id = self::channel_id(channel_id)?;
        let page = id
            .messages(&self.http, GetMessages::new().limit(RECENT_SCAN_LIMIT))
            .await
            .map_err(|e| ChannelError::FetchFailed {
                channel: channel_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(page
            .into_iter()
            .find(|m| {
                m.author.id.to_string() == user_id
                    && m.id.to_string() != exclude_message_id
                    && !m.content.trim().is_empty()
            })
            .map(|m| m.content))
    }
}
