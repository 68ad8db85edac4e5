//! Reply pipeline for one chat message.
//!
//! 1. **Gate**: ignore bots, direct messages, anything but plain text
//!    channels, busy threads, channels outside the allowlist, messages
//!    pinging other users and media/market requests; answer member insight
//!    requests from the member directory; then roll the reply chance
//! 2. **Retrieve** grounding snippets from the current index snapshot
//! 3. **Assemble** the prompt and **budget** it to the input ceiling
//! 4. **Generate** with the provider stack; any failure means no text
//! 5. **Sanitize**, falling back to a canned reply

use banter_config::{BotConfig, KnowledgeConfig};
use banter_core::channel::IncomingMessage;
use banter_core::member::MemberSource;
use banter_core::provider::{Provider, ProviderRequest};
use banter_knowledge::{
    KnowledgeIndex, RetrievalConfig, RetrievalQuery, Retriever, TimestampFormatter, formatter_from_locale,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, info, warn};

use crate::activity::{ActivityTracker, MAX_STARTER_CHARS, canned_starter};
use crate::budget::{BudgetPolicy, BudgetReport, ContextBudgeter, PromptSet};
use crate::insight::describe_member;
use crate::intent::{Intent, is_question_like};
use crate::prompt::PromptBuilder;

/// Sent when the model produced nothing usable.
pub const FALLBACK_REPLY: &str = "Got you. 👍";

static MASS_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(?:here|everyone)").expect("mass mention pattern is valid"));

/// Remove mass pings and surrounding whitespace.
pub fn sanitize_reply(text: &str) -> String {
    MASS_MENTION.replace_all(text, "").trim().to_string()
}

/// Why a message was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    FromBot,
    DirectMessage,
    /// Anything but a plain server text channel
    NotTextChannel,
    /// A thread with more than two members
    BusyThread,
    ChannelNotAllowed,
    MentionsOthers,
    Empty,
}

/// Outcome of the reply gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    Ignored(IgnoreReason),
    /// Recognised but not answered by the model
    NonChat(Intent),
    /// The reply roll said stay quiet
    Quiet,
    Reply,
}

/// A generated answer and how it was produced.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub snippets: Vec<String>,
    pub budget: BudgetReport,
    /// False when the canned fallback was used
    pub from_model: bool,
}

/// Model call parameters.
#[derive(Debug, Clone)]
struct ModelSettings {
    model: String,
    temperature: f32,
    max_response_tokens: u32,
}

pub struct Responder {
    index: Arc<KnowledgeIndex>,
    formatter: Arc<dyn TimestampFormatter>,
    retriever: Retriever,
    knowledge: KnowledgeConfig,
    prompts: PromptBuilder,
    budgeter: ContextBudgeter,
    provider: Option<Arc<dyn Provider>>,
    members: Option<Arc<dyn MemberSource>>,
    model: ModelSettings,
    activity: Arc<ActivityTracker>,
    allowlist: Vec<String>,
    reply_chance: f64,
    reply_chance_question: f64,
    starter_use_ai: bool,
    rng: Mutex<StdRng>,
}

impl Responder {
    /// `provider` is `None` when no model is configured; every reply then
    /// falls back to the canned text.
    pub fn new(
        config: &BotConfig,
        index: Arc<KnowledgeIndex>,
        provider: Option<Arc<dyn Provider>>,
        activity: Arc<ActivityTracker>,
    ) -> Self {
        let formatter = formatter_from_locale(&config.locale);
        let retriever = Retriever::new(RetrievalConfig::from_config(&config.knowledge), formatter.clone());

        Self {
            index,
            formatter,
            retriever,
            knowledge: config.knowledge.clone(),
            prompts: PromptBuilder::new(&config.behaviour.persona, &config.locale.language),
            budgeter: ContextBudgeter::new(BudgetPolicy::from_config(&config.provider, &config.budget)),
            provider,
            members: None,
            model: ModelSettings {
                model: config.provider.model.clone(),
                temperature: config.provider.temperature,
                max_response_tokens: config.provider.max_response_tokens,
            },
            activity,
            allowlist: config.discord.channel_allowlist.clone(),
            reply_chance: config.behaviour.reply_chance,
            reply_chance_question: config.behaviour.reply_chance_question,
            starter_use_ai: config.behaviour.starter_use_ai,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the random source (deterministic tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Answer member insight requests from `members`. Without one they are
    /// skipped like other non-chat requests.
    pub fn with_members(mut self, members: Arc<dyn MemberSource>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    /// Empty allowlist means every channel.
    pub fn channel_allowed(&self, channel_name: &str) -> bool {
        self.allowlist.is_empty() || self.allowlist.iter().any(|c| c == channel_name)
    }

    /// Checks that do not depend on randomness.
    fn screen(&self, message: &IncomingMessage) -> Option<IgnoreReason> {
        if message.author_is_bot {
            return Some(IgnoreReason::FromBot);
        }
        if message.guild_id.is_none() {
            return Some(IgnoreReason::DirectMessage);
        }
        if message.channel_kind.is_busy_thread() {
            return Some(IgnoreReason::BusyThread);
        }
        if !message.channel_kind.is_text() {
            return Some(IgnoreReason::NotTextChannel);
        }
        if !self.channel_allowed(&message.channel_name) {
            return Some(IgnoreReason::ChannelNotAllowed);
        }
        None
    }

    /// Decide whether to answer `message`.
    pub fn gate(&self, message: &IncomingMessage) -> Gate {
        if let Some(reason) = self.screen(message) {
            return Gate::Ignored(reason);
        }

        let text = message.content.trim();
        let intent = Intent::classify(text);
        // Insight requests name the member they ask about.
        if matches!(intent, Intent::MemberInsight { .. }) {
            return Gate::NonChat(intent);
        }
        if message.mentions_other_user() {
            return Gate::Ignored(IgnoreReason::MentionsOthers);
        }
        if text.is_empty() {
            return Gate::Ignored(IgnoreReason::Empty);
        }
        if !intent.is_chat() {
            return Gate::NonChat(intent);
        }

        let chance = if is_question_like(text) {
            self.reply_chance_question
        } else {
            self.reply_chance
        };
        let roll: f64 = self.rng.lock().unwrap_or_else(|e| e.into_inner()).random();
        if roll < chance { Gate::Reply } else { Gate::Quiet }
    }

    /// Full handling of a live message. Returns the text to post, if any.
    pub async fn handle(&self, message: &IncomingMessage) -> Option<String> {
        if self.screen(message).is_none() {
            self.activity.record_message(&message.channel_id, message.timestamp);
        }

        match self.gate(message) {
            Gate::Reply => {}
            Gate::NonChat(Intent::MemberInsight { user_id }) => {
                return self.insight(message, user_id.as_deref()).await;
            }
            Gate::NonChat(intent) => {
                info!(channel = %message.channel_name, intent = ?intent, "Skipping media or market request");
                return None;
            }
            other => {
                debug!(channel = %message.channel_name, gate = ?other, "Not replying");
                return None;
            }
        }

        let reply = self.answer(&message.content, Utc::now()).await;

        if !self.activity.record_reply_if_new(&message.channel_id, &reply.text) {
            info!(channel = %message.channel_name, "Suppressing repeated reply");
            return None;
        }

        info!(
            channel = %message.channel_name,
            snippets = reply.snippets.len(),
            from_model = reply.from_model,
            prompt_tokens = reply.budget.after_tokens,
            "Replying"
        );
        Some(reply.text)
    }

    /// Describe the member a request asks about, or the author.
    async fn insight(&self, message: &IncomingMessage, user_id: Option<&str>) -> Option<String> {
        let Some(members) = &self.members else {
            info!(channel = %message.channel_name, "No member directory, skipping insight request");
            return None;
        };
        let text = describe_member(members.as_ref(), message, user_id, self.formatter.as_ref(), Utc::now()).await;
        info!(channel = %message.channel_name, member = user_id.unwrap_or("author"), "Replying with member insight");
        Some(sanitize_reply(&text))
    }

    /// Grounding snippets for `text` from the current snapshot.
    pub fn retrieve(&self, text: &str, now: DateTime<Utc>) -> Vec<String> {
        let snapshot = self.index.current_snapshot();
        let query = RetrievalQuery::from_config(text, &self.knowledge);
        self.retriever.retrieve(&snapshot, &query, now)
    }

    /// Answer `text` unconditionally.
    pub async fn answer(&self, text: &str, now: DateTime<Utc>) -> Reply {
        let snippets = self.retrieve(text, now);
        let mut prompt = self.prompts.reply(text, &snippets);
        let budget = self.budgeter.budget(&mut prompt);

        let generated = sanitize_reply(&self.generate(prompt).await);
        let from_model = !generated.is_empty();
        let text = if from_model {
            generated
        } else {
            FALLBACK_REPLY.to_string()
        };

        Reply {
            text,
            snippets,
            budget,
            from_model,
        }
    }

    /// An icebreaker for a quiet channel.
    pub async fn starter(&self) -> String {
        if self.starter_use_ai {
            let mut prompt = self.prompts.starter();
            self.budgeter.budget(&mut prompt);
            let text = sanitize_reply(&self.generate(prompt).await);
            if !text.is_empty() {
                return text.chars().take(MAX_STARTER_CHARS).collect();
            }
        }
        canned_starter().to_string()
    }

    /// Run the prompt through the provider. Failures yield empty text.
    async fn generate(&self, prompt: PromptSet) -> String {
        let Some(provider) = &self.provider else {
            debug!("No provider configured, using fallback text");
            return String::new();
        };

        let request = ProviderRequest::new(&self.model.model, prompt.into_messages())
            .with_max_tokens(self.model.max_response_tokens)
            .with_temperature(self.model.temperature);

        match provider.complete(request).await {
            Ok(response) => {
                debug!(model = %response.model, usage = ?response.usage, "Model responded");
                response.content
            }
            Err(e) => {
                warn!(provider = %provider.name(), error = %e, "Model call failed");
                String::new()
            }
        }
    }
}
