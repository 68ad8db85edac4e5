//! Provider fallback: ordered retry chain with optional per-entry timeouts.
//!
//! Each entry is a provider plus an optional model override, so one backend
//! can serve a primary and a fallback model. When an entry fails (timeout,
//! rate limit, error) the next one is tried. A quota rejection that names an
//! affordable token count is retried once on the same entry with a smaller
//! output ceiling before moving on.

use async_trait::async_trait;
use banter_config::ProviderConfig;
use banter_core::error::ProviderError;
use banter_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tokens held back from the affordable count on a quota retry.
const QUOTA_MARGIN: u32 = 5;

/// Output ceiling bounds for quota-driven retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRetry {
    pub min_tokens: u32,
    pub max_tokens: u32,
}

impl QuotaRetry {
    /// `clamp(affordable - 5, min_tokens, max_tokens)`.
    pub fn ceiling(&self, affordable: u32) -> u32 {
        affordable
            .saturating_sub(QUOTA_MARGIN)
            .max(self.min_tokens)
            .min(self.max_tokens)
    }
}

/// A provider that wraps an ordered list of providers and falls back on failure.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry>,
    quota_retry: Option<QuotaRetry>,
}

/// A single entry in the fallback chain.
struct FallbackEntry {
    provider: Arc<dyn banter_core::Provider>,
    model: Option<String>,
    /// `None` when the wrapped provider bounds its own calls
    timeout: Option<Duration>,
}

impl FallbackProvider {
    /// Create a new fallback provider with no entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
            quota_retry: None,
        }
    }

    /// Primary model, then the fallback model when it differs, both served
    /// by `provider`.
    ///
    /// Entries get no deadline here. `provider` is expected to bound each
    /// call itself (see [`crate::ThrottledProvider::with_call_timeout`]) so
    /// that time spent queued for a throttle slot never counts as a timeout.
    pub fn from_config(provider: Arc<dyn banter_core::Provider>, config: &ProviderConfig) -> Self {
        let mut fallback =
            Self::new(provider.name().to_string()).add_model(provider.clone(), config.model.clone(), None);

        if let Some(model) = config
            .model_fallback
            .as_ref()
            .filter(|m| !m.trim().is_empty() && **m != config.model)
        {
            fallback = fallback.add_model(provider, model.clone(), None);
        }

        if config.retry_on_quota {
            fallback = fallback.with_quota_retry(QuotaRetry {
                min_tokens: config.min_response_tokens,
                max_tokens: config.max_response_tokens,
            });
        }
        fallback
    }

    /// Add a provider to the fallback chain with a custom timeout.
    pub fn add(mut self, provider: Arc<dyn banter_core::Provider>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            model: None,
            timeout: Some(timeout),
        });
        self
    }

    /// Add a provider that is always asked for `model`.
    pub fn add_model(
        mut self,
        provider: Arc<dyn banter_core::Provider>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            model: Some(model.into()),
            timeout,
        });
        self
    }

    /// Add a provider without a deadline of its own, as `from_config` does.
    /// The configured `provider.timeout_secs` is enforced beneath the
    /// throttle by [`crate::build_from_config`], not by the chain.
    pub fn add_default(mut self, provider: Arc<dyn banter_core::Provider>) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            model: None,
            timeout: None,
        });
        self
    }

    pub fn with_quota_retry(mut self, retry: QuotaRetry) -> Self {
        self.quota_retry = Some(retry);
        self
    }

    /// Number of entries in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    async fn attempt(
        entry: &FallbackEntry,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let Some(limit) = entry.timeout else {
            return entry.provider.complete(request).await;
        };
        match tokio::time::timeout(limit, entry.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "Provider '{}' timed out after {}s",
                entry.provider.name(),
                limit.as_secs()
            ))),
        }
    }

    /// The smaller ceiling to retry with, if this error warrants one.
    fn quota_ceiling(&self, error: &ProviderError, requested: Option<u32>) -> Option<u32> {
        let retry = self.quota_retry?;
        let ProviderError::QuotaExceeded {
            affordable: Some(affordable),
            ..
        } = error
        else {
            return None;
        };
        let requested = requested.unwrap_or(retry.max_tokens);
        (*affordable < requested).then(|| retry.ceiling(*affordable))
    }
}

#[async_trait]
impl banter_core::Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut last_error = ProviderError::NotConfigured("No providers in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let mut attempt_request = request.clone();
            if let Some(model) = &entry.model {
                attempt_request.model = model.clone();
            }

            info!(
                provider = %entry.provider.name(),
                model = %attempt_request.model,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying provider"
            );

            let error = match Self::attempt(entry, attempt_request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let error = match self.quota_ceiling(&error, attempt_request.max_tokens) {
                Some(ceiling) => {
                    info!(
                        model = %attempt_request.model,
                        max_tokens = ceiling,
                        "Fallback: quota exceeded, retrying with smaller ceiling"
                    );
                    match Self::attempt(entry, attempt_request.with_max_tokens(ceiling)).await {
                        Ok(response) => return Ok(response),
                        Err(e) => e,
                    }
                }
                None => error,
            };

            warn!(
                provider = %entry.provider.name(),
                error = %error,
                "Fallback: provider failed, trying next"
            );
            last_error = error;
        }

        Err(last_error)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        for entry in &self.chain {
            if let Ok(true) = entry.provider.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
