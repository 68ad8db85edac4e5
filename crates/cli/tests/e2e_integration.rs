//! End-to-end tests for the Banter reply pipeline.
//!
//! These tests drive the runtime from a gateway message to a posted reply,
//! covering history scanning, retrieval, prompt budgeting and the model
//! fallback chain, with in-memory stand-ins for Discord and the model API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use banter_agent::{ActivityTracker, BotRuntime, FALLBACK_REPLY, Responder, estimate_tokens};
use banter_config::BotConfig;
use banter_core::channel::{Channel, ChannelKind, IncomingMessage};
use banter_core::error::{ChannelError, ProviderError};
use banter_core::history::{HistoryChannel, HistoryMessage, HistorySource};
use banter_core::message::Role;
use banter_core::provider::{Provider, ProviderRequest, ProviderResponse};
use banter_knowledge::{BuildOutcome, IndexConfig, KnowledgeIndex};
use banter_providers::FallbackProvider;
use chrono::{Duration, Utc};
use tokio::sync::mpsc;

// ── Mock Discord ─────────────────────────────────────────────────────────

/// Channel history held in memory, newest first, paged by message id.
#[derive(Default)]
struct MemoryHistory {
    channels: Vec<HistoryChannel>,
    messages: HashMap<String, Vec<HistoryMessage>>,
}

impl MemoryHistory {
    fn with_channel(mut self, id: &str, name: &str, contents: &[&str]) -> Self {
        let now = Utc::now();
        let messages = contents
            .iter()
            .enumerate()
            .map(|(i, content)| HistoryMessage {
                id: format!("{id}-{i}"),
                author: "mod".into(),
                author_is_bot: false,
                content: content.to_string(),
                timestamp: now - Duration::minutes(i as i64),
            })
            .collect();
        self.channels.push(HistoryChannel::text(id, name));
        self.messages.insert(id.to_string(), messages);
        self
    }
}

#[async_trait]
impl HistorySource for MemoryHistory {
    async fn list_channels(&self) -> Result<Vec<HistoryChannel>, ChannelError> {
        Ok(self.channels.clone())
    }

    async fn can_read(&self, _channel: &HistoryChannel) -> bool {
        true
    }

    async fn fetch_batch(
        &self,
        channel: &HistoryChannel,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, ChannelError> {
        let all = self.messages.get(&channel.id).cloned().unwrap_or_default();
        let start = match before {
            Some(cursor) => all.iter().position(|m| m.id == cursor).map_or(all.len(), |p| p + 1),
            None => 0,
        };
        Ok(all.into_iter().skip(start).take(limit as usize).collect())
    }
}

/// Records everything the bot posts.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, String, Option<String>)>>,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<IncomingMessage, ChannelError>>, ChannelError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, channel_id: &str, content: &str, reply_to: Option<&str>) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((
            channel_id.to_string(),
            content.to_string(),
            reply_to.map(String::from),
        ));
        Ok(())
    }
}

// ── Mock Model ───────────────────────────────────────────────────────────

/// A model API that records requests and can reject large completions the
/// way a low-balance account does.
struct ScriptedModel {
    reply: String,
    affordable: Option<u32>,
    down: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedModel {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.into(),
            affordable: None,
            down: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.down {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: "upstream unavailable".into(),
            });
        }
        if let (Some(affordable), Some(asked)) = (self.affordable, request.max_tokens) {
            if asked > affordable {
                return Err(ProviderError::QuotaExceeded {
                    message: format!("You can only afford {affordable} tokens"),
                    affordable: Some(affordable),
                });
            }
        }
        Ok(ProviderResponse {
            content: self.reply.clone(),
            usage: None,
            model: request.model,
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn config() -> BotConfig {
    let mut config = BotConfig::default();
    config.discord.channel_allowlist = vec!["general".into()];
    config.knowledge.channel_names = vec!["faq".into()];
    config.behaviour.reply_chance = 1.0;
    config.behaviour.reply_chance_question = 1.0;
    config.provider.model = "primary".into();
    config
}

fn history() -> Arc<MemoryHistory> {
    Arc::new(
        MemoryHistory::default()
            .with_channel(
                "faq-id",
                "faq",
                &[
                    "The mint is on Friday at 16:00 UTC, whitelist first",
                    "Roadmap update coming next week",
                    "Reminder: never share your seed phrase",
                ],
            )
            .with_channel("general-id", "general", &["gm", "gm gm"]),
    )
}

fn message(channel: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        message_id: "4242".into(),
        guild_id: Some("1".into()),
        channel_id: format!("{channel}-id"),
        channel_name: channel.into(),
        channel_kind: ChannelKind::Text,
        author_id: "7".into(),
        author_name: "alice".into(),
        author_is_bot: false,
        content: content.into(),
        mentions: vec![],
        timestamp: Utc::now(),
    }
}

fn user_prompt(request: &ProviderRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn grounded_reply_end_to_end() {
    let model = Arc::new(ScriptedModel::replying("Friday 16:00 UTC, @everyone get ready"));
    let channel = Arc::new(RecordingChannel::default());
    let runtime = BotRuntime::new(&config(), channel.clone(), history(), Some(model.clone()));

    match runtime.refresh_index().await {
        BuildOutcome::Built { snapshot, sources_scanned, .. } => {
            assert_eq!(sources_scanned, 1);
            assert_eq!(snapshot.len(), 3);
        }
        other => panic!("Expected Built, got: {other:?}"),
    }

    let posted = runtime
        .handle_message(message("general", "when is the mint on friday?"))
        .await
        .unwrap();
    assert!(posted);

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    let prompt = user_prompt(&requests[0]);
    assert!(prompt.starts_with("User said: \"when is the mint on friday?\""));
    assert!(prompt.contains("Knowledge:\n- [#faq]"));
    assert!(prompt.contains("The mint is on Friday"));
    assert!(!prompt.contains("seed phrase"));

    let sent = channel.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "general-id");
    assert_eq!(sent[0].1, "Friday 16:00 UTC,  get ready");
    assert_eq!(sent[0].2.as_deref(), Some("4242"));
}

#[tokio::test]
async fn ignored_channels_and_bots_get_nothing() {
    let model = Arc::new(ScriptedModel::replying("hi"));
    let channel = Arc::new(RecordingChannel::default());
    let runtime = BotRuntime::new(&config(), channel.clone(), history(), Some(model.clone()));

    assert!(!runtime.handle_message(message("faq", "when is the mint?")).await.unwrap());

    let mut from_bot = message("general", "when is the mint?");
    from_bot.author_is_bot = true;
    assert!(!runtime.handle_message(from_bot).await.unwrap());

    assert!(!runtime.handle_message(message("general", "gif: party parrot")).await.unwrap());

    let mut busy_thread = message("general", "when is the mint?");
    busy_thread.channel_kind = ChannelKind::Thread { member_count: 6 };
    assert!(!runtime.handle_message(busy_thread).await.unwrap());

    let mut voice_chat = message("general", "when is the mint?");
    voice_chat.channel_kind = ChannelKind::Other;
    assert!(!runtime.handle_message(voice_chat).await.unwrap());

    assert!(model.requests().is_empty());
    assert!(channel.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn quota_rejection_retries_with_smaller_ceiling() {
    let mut config = config();
    config.provider.model_fallback = Some("backup".into());
    config.provider.max_response_tokens = 160;
    config.provider.min_response_tokens = 60;

    let model = Arc::new(ScriptedModel {
        affordable: Some(100),
        ..ScriptedModel::replying("short and sweet")
    });
    let stack: Arc<dyn Provider> = Arc::new(FallbackProvider::from_config(model.clone(), &config.provider));
    let channel = Arc::new(RecordingChannel::default());
    let runtime = BotRuntime::new(&config, channel.clone(), history(), Some(stack));

    assert!(runtime.handle_message(message("general", "gm all")).await.unwrap());

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "primary");
    assert_eq!(requests[0].max_tokens, Some(160));
    assert_eq!(requests[1].model, "primary");
    assert_eq!(requests[1].max_tokens, Some(95));
    assert_eq!(channel.sent.lock().unwrap()[0].1, "short and sweet");
}

#[tokio::test]
async fn model_outage_falls_back_to_canned_reply() {
    let mut config = config();
    config.provider.model_fallback = Some("backup".into());

    let model = Arc::new(ScriptedModel {
        down: true,
        ..ScriptedModel::replying("unused")
    });
    let stack: Arc<dyn Provider> = Arc::new(FallbackProvider::from_config(model.clone(), &config.provider));
    let channel = Arc::new(RecordingChannel::default());
    let runtime = BotRuntime::new(&config, channel.clone(), history(), Some(stack));

    assert!(runtime.handle_message(message("general", "anyone around?")).await.unwrap());

    let models: Vec<String> = model.requests().into_iter().map(|r| r.model).collect();
    assert_eq!(models, vec!["primary", "backup"]);
    assert_eq!(channel.sent.lock().unwrap()[0].1, FALLBACK_REPLY);

    // The same canned text is not posted twice in a row.
    assert!(!runtime.handle_message(message("general", "hello?")).await.unwrap());
}

#[tokio::test]
async fn oversized_prompt_is_trimmed_but_persona_survives() {
    let mut config = config();
    // Room for the persona plus about 400 chars of everything else.
    config.provider.max_input_tokens = estimate_tokens(&config.behaviour.persona) + 100;
    config.knowledge.snippet_chars = 400;
    config.knowledge.max_content_chars = 1000;

    let long_faq = format!("The mint is on Friday. {}", "Details follow. ".repeat(40));
    let history = MemoryHistory::default().with_channel("faq-id", "faq", &[long_faq.as_str()]);

    let index = Arc::new(KnowledgeIndex::new(IndexConfig::from_config(&config.knowledge)));
    assert!(matches!(index.rebuild(&history).await, BuildOutcome::Built { .. }));

    let model = Arc::new(ScriptedModel::replying("Friday!"));
    let responder = Responder::new(
        &config,
        index,
        Some(model.clone()),
        Arc::new(ActivityTracker::new(Utc::now())),
    );

    let reply = responder.answer("when is the mint on friday", Utc::now()).await;
    assert_eq!(reply.text, "Friday!");
    assert_eq!(reply.snippets.len(), 1);
    assert!(reply.budget.chars_trimmed > 0);
    assert!(reply.budget.within_budget);
    assert!(reply.budget.after_tokens < reply.budget.before_tokens);

    let requests = model.requests();
    let system = requests[0]
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .unwrap();
    assert_eq!(system.content, config.behaviour.persona);
    assert!(user_prompt(&requests[0]).starts_with("User said:"));
}
