//! Language-model provider implementations for Banter.
//!
//! All providers implement the `banter_core::Provider` trait. The runtime
//! stacks them as `FallbackProvider` (model chain, quota retry) over
//! `ThrottledProvider` (call spacing, per-call timeout) over
//! `OpenAiCompatProvider` (HTTP).

pub mod fallback;
pub mod openai_compat;
pub mod throttle;

pub use fallback::{FallbackProvider, QuotaRetry};
pub use openai_compat::OpenAiCompatProvider;
pub use throttle::ThrottledProvider;

use banter_config::ProviderConfig;
use banter_core::error::ProviderError;
use std::sync::Arc;
use std::time::Duration;

/// Build the full provider stack from configuration.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn banter_core::Provider>, ProviderError> {
    let http: Arc<dyn banter_core::Provider> = Arc::new(OpenAiCompatProvider::from_config(config)?);
    Ok(stack(http, config))
}

/// Wrap a backend in the throttle and the model chain.
///
/// The timeout (`timeout_secs` plus a 5s grace) sits under the throttle, so
/// it covers the backend call only and never the wait for a slot.
pub fn stack(backend: Arc<dyn banter_core::Provider>, config: &ProviderConfig) -> Arc<dyn banter_core::Provider> {
    let throttled: Arc<dyn banter_core::Provider> = Arc::new(
        ThrottledProvider::new(backend, Duration::from_millis(config.throttle_ms))
            .with_call_timeout(Duration::from_secs(config.timeout_secs.saturating_add(5))),
    );
    Arc::new(FallbackProvider::from_config(throttled, config))
}
