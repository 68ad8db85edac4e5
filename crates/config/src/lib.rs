//! Configuration loading, validation, and management for Banter.
//!
//! Loads configuration from `~/.banter/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every tunable of
//! the knowledge index, retriever and context budgeter is a named field
//! here; the algorithmic crates receive them through explicit constructor
//! arguments and never read the environment themselves.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.banter/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Discord connection settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Language-model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Knowledge index and retrieval settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Prompt budgeting settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Chat participation settings
    #[serde(default)]
    pub behaviour: BehaviourConfig,

    /// Language and timestamp display
    #[serde(default)]
    pub locale: LocaleConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from the Discord Developer Portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Channel names the bot chats in. Empty = every text channel.
    #[serde(default)]
    pub channel_allowlist: Vec<String>,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &redact(&self.token))
            .field("channel_allowlist", &self.channel_allowlist)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Tried after the primary model fails. Ignored when equal to `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_fallback: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Minimum spacing between two model calls
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// HTTP timeout per model call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Approximate prompt token ceiling enforced by the budgeter
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Floor for quota-driven retries
    #[serde(default = "default_min_response_tokens")]
    pub min_response_tokens: u32,

    /// Retry once with an affordable ceiling on HTTP 402
    #[serde(default = "default_true")]
    pub retry_on_quota: bool,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openrouter/auto".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_throttle_ms() -> u64 {
    6000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_tokens() -> usize {
    900
}
fn default_max_response_tokens() -> u32 {
    160
}
fn default_min_response_tokens() -> u32 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            model_fallback: None,
            temperature: default_temperature(),
            throttle_ms: default_throttle_ms(),
            timeout_secs: default_timeout_secs(),
            max_input_tokens: default_max_input_tokens(),
            max_response_tokens: default_max_response_tokens(),
            min_response_tokens: default_min_response_tokens(),
            retry_on_quota: true,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("model_fallback", &self.model_fallback)
            .field("temperature", &self.temperature)
            .field("throttle_ms", &self.throttle_ms)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_input_tokens", &self.max_input_tokens)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("min_response_tokens", &self.min_response_tokens)
            .field("retry_on_quota", &self.retry_on_quota)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Channel IDs to index. Takes precedence over `channel_names`.
    #[serde(default)]
    pub channel_ids: Vec<String>,

    /// Channel names to index when no ID resolves
    #[serde(default)]
    pub channel_names: Vec<String>,

    #[serde(default = "default_max_messages_per_channel")]
    pub max_messages_per_channel: usize,

    /// Global document budget across all channels
    #[serde(default = "default_max_total_messages")]
    pub max_total_messages: usize,

    /// Content is cut to this many characters at ingestion
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Rebuild interval. 0 = build once at startup.
    #[serde(default)]
    pub refresh_minutes: u64,

    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: u64,

    #[serde(default = "default_recency_bonus")]
    pub recency_bonus: f32,

    #[serde(default = "default_min_score")]
    pub min_score: f32,

    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,

    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    #[serde(default = "default_total_chars")]
    pub total_chars: usize,
}

fn default_max_messages_per_channel() -> usize {
    1500
}
fn default_max_total_messages() -> usize {
    5000
}
fn default_max_content_chars() -> usize {
    500
}
fn default_recency_window_hours() -> u64 {
    72
}
fn default_recency_bonus() -> f32 {
    0.5
}
fn default_min_score() -> f32 {
    2.0
}
fn default_max_snippets() -> usize {
    2
}
fn default_snippet_chars() -> usize {
    150
}
fn default_total_chars() -> usize {
    400
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            channel_ids: vec![],
            channel_names: vec![],
            max_messages_per_channel: default_max_messages_per_channel(),
            max_total_messages: default_max_total_messages(),
            max_content_chars: default_max_content_chars(),
            refresh_minutes: 0,
            recency_window_hours: default_recency_window_hours(),
            recency_bonus: default_recency_bonus(),
            min_score: default_min_score(),
            max_snippets: default_max_snippets(),
            snippet_chars: default_snippet_chars(),
            total_chars: default_total_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Characters removed from a message per trim step
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Messages are never trimmed below this many characters
    #[serde(default = "default_floor_chars")]
    pub floor_chars: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_chunk_chars() -> usize {
    200
}
fn default_floor_chars() -> usize {
    40
}
fn default_max_iterations() -> usize {
    64
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            floor_chars: default_floor_chars(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviourConfig {
    #[serde(default = "default_reply_chance")]
    pub reply_chance: f64,

    /// Used instead of `reply_chance` for question-like messages
    #[serde(default = "default_reply_chance_question")]
    pub reply_chance_question: f64,

    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: u64,

    #[serde(default = "default_starter_cooldown_minutes")]
    pub starter_cooldown_minutes: u64,

    #[serde(default)]
    pub starter_use_ai: bool,

    /// System persona sent with every model call
    #[serde(default = "default_persona")]
    pub persona: String,
}

fn default_reply_chance() -> f64 {
    0.30
}
fn default_reply_chance_question() -> f64 {
    0.85
}
fn default_idle_minutes() -> u64 {
    25
}
fn default_starter_cooldown_minutes() -> u64 {
    45
}
fn default_persona() -> String {
    "You are a cheeky, kind Discord companion. Keep replies short (max ~90 words), \
     never use @here or @everyone. If you're not sure, say so briefly. \
     Use knowledge snippets if provided."
        .into()
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            reply_chance: default_reply_chance(),
            reply_chance_question: default_reply_chance_question(),
            idle_minutes: default_idle_minutes(),
            starter_cooldown_minutes: default_starter_cooldown_minutes(),
            starter_use_ai: false,
            persona: default_persona(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    #[serde(default = "default_language")]
    pub language: String,

    /// IANA zone for displayed timestamps (e.g. "Europe/London"). Empty
    /// means use `utc_offset_minutes` instead.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Fixed offset used when `timezone` is empty
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// chrono strftime pattern
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_language() -> String {
    "en-GB".into()
}
fn default_timezone() -> String {
    "Europe/London".into()
}
fn default_timestamp_format() -> String {
    "%d %b %Y %H:%M".into()
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            timezone: default_timezone(),
            utc_offset_minutes: 0,
            timestamp_format: default_timestamp_format(),
        }
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl BotConfig {
    /// Load configuration from the default path (~/.banter/config.toml).
    ///
    /// Environment variables override file values; see [`BotConfig::apply_env`].
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Recognised keys: `DISCORD_TOKEN`, `OPENAI_API_KEY`, `OPENROUTER_API_KEY`,
    /// `OPENAI_BASE_URL`, `MODEL`, `MODEL_FALLBACK`, `CHANNEL_NAME_ALLOWLIST`,
    /// `KNOWLEDGE_CHANNEL_IDS`, `KNOWLEDGE_CHANNELS`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        if self.provider.api_key.is_none() {
            self.provider.api_key = get("OPENAI_API_KEY").or_else(|| get("OPENROUTER_API_KEY"));
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = get("MODEL") {
            self.provider.model = model;
        }
        if let Some(model) = get("MODEL_FALLBACK") {
            self.provider.model_fallback = Some(model);
        }
        if let Some(list) = get("CHANNEL_NAME_ALLOWLIST") {
            self.discord.channel_allowlist = split_list(&list);
        }
        if let Some(list) = get("KNOWLEDGE_CHANNEL_IDS") {
            self.knowledge.channel_ids = split_list(&list);
        }
        if let Some(list) = get("KNOWLEDGE_CHANNELS") {
            self.knowledge.channel_names = split_list(&list);
        }
        if let Some(zone) = get("TIMEZONE") {
            self.locale.timezone = zone;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".banter")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chance_ok = |c: f64| (0.0..=1.0).contains(&c);
        if !chance_ok(self.behaviour.reply_chance) || !chance_ok(self.behaviour.reply_chance_question) {
            return Err(ConfigError::ValidationError(
                "reply chances must be between 0.0 and 1.0".into(),
            ));
        }

        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.provider.min_response_tokens > self.provider.max_response_tokens {
            return Err(ConfigError::ValidationError(
                "provider.min_response_tokens must not exceed max_response_tokens".into(),
            ));
        }

        if self.knowledge.recency_bonus < 0.0 {
            return Err(ConfigError::ValidationError(
                "knowledge.recency_bonus must be >= 0".into(),
            ));
        }

        if self.budget.chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "budget.chunk_chars must be > 0".into(),
            ));
        }

        let zone = self.locale.timezone.trim();
        if !zone.is_empty() && zone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "locale.timezone '{zone}' is not a known IANA zone"
            )));
        }

        Ok(())
    }

    /// Whether a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
