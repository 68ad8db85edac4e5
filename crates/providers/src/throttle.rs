//! Minimum spacing between model calls.
//!
//! Callers queue on an async mutex and sleep until their slot opens; a
//! throttled call waits, it never fails. The optional call timeout starts
//! only once the slot is claimed.

use async_trait::async_trait;
use banter_core::error::ProviderError;
use banter_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Wraps a provider so consecutive calls start at least `spacing` apart.
pub struct ThrottledProvider {
    inner: Arc<dyn banter_core::Provider>,
    spacing: Duration,
    call_timeout: Option<Duration>,
    last_call: Mutex<Option<Instant>>,
}

impl ThrottledProvider {
    pub fn new(inner: Arc<dyn banter_core::Provider>, spacing: Duration) -> Self {
        Self {
            inner,
            spacing,
            call_timeout: None,
            last_call: Mutex::new(None),
        }
    }

    /// Bound each inner call by `limit`, measured from when the call is
    /// released by the throttle.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    /// Wait for the next free slot and claim it.
    async fn acquire_slot(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.spacing;
            let now = Instant::now();
            if ready_at > now {
                debug!(
                    provider = %self.inner.name(),
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "Throttling model call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl banter_core::Provider for ThrottledProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.acquire_slot().await;
        let Some(limit) = self.call_timeout else {
            return self.inner.complete(request).await;
        };
        tokio::time::timeout(limit, self.inner.complete(request))
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.inner.name(),
                    limit.as_secs()
                )))
            })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::Provider;
    use banter_core::message::Message;
    use std::sync::Mutex as StdMutex;

    struct ClockProvider {
        started: StdMutex<Vec<Instant>>,
    }

    #[async_trait]
    impl banter_core::Provider for ClockProvider {
        fn name(&self) -> &str {
            "clock"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            self.started.lock().unwrap().push(Instant::now());
            Ok(ProviderResponse {
                content: "ok".into(),
                usage: None,
                model: request.model,
            })
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new("m", vec![Message::user("hi")])
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced() {
        let inner = Arc::new(ClockProvider { started: StdMutex::new(Vec::new()) });
        let throttled = ThrottledProvider::new(inner.clone(), Duration::from_secs(6));

        for _ in 0..3 {
            throttled.complete(request()).await.unwrap();
        }

        let started = inner.started.lock().unwrap().clone();
        assert_eq!(started.len(), 3);
        assert!(started[1] - started[0] >= Duration::from_secs(6));
        assert!(started[2] - started[1] >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let inner = Arc::new(ClockProvider { started: StdMutex::new(Vec::new()) });
        let throttled = ThrottledProvider::new(inner.clone(), Duration::from_secs(6));

        let before = Instant::now();
        throttled.complete(request()).await.unwrap();
        assert!(inner.started.lock().unwrap()[0] - before < Duration::from_millis(1));
    }

    struct StalledProvider;

    #[async_trait]
    impl banter_core::Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Network("never".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_bounds_the_inner_call() {
        let throttled = ThrottledProvider::new(Arc::new(StalledProvider), Duration::from_secs(6))
            .with_call_timeout(Duration::from_secs(35));

        let before = Instant::now();
        match throttled.complete(request()).await.unwrap_err() {
            ProviderError::Timeout(msg) => assert!(msg.contains("stalled")),
            other => panic!("Expected Timeout, got: {other:?}"),
        }
        let waited = Instant::now() - before;
        assert!(waited >= Duration::from_secs(35) && waited < Duration::from_secs(36));
    }

    #[tokio::test(start_paused = true)]
    async fn queueing_does_not_count_against_call_timeout() {
        let inner = Arc::new(ClockProvider { started: StdMutex::new(Vec::new()) });
        let throttled = Arc::new(
            ThrottledProvider::new(inner.clone(), Duration::from_secs(6))
                .with_call_timeout(Duration::from_secs(10)),
        );

        // The last caller waits 54s for its slot, far beyond the timeout.
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let t = throttled.clone();
                tokio::spawn(async move { t.complete(request()).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(inner.started.lock().unwrap().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_wait_rather_than_fail() {
        let inner = Arc::new(ClockProvider { started: StdMutex::new(Vec::new()) });
        let throttled = Arc::new(ThrottledProvider::new(inner.clone(), Duration::from_secs(2)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = throttled.clone();
                tokio::spawn(async move { t.complete(request()).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let mut started = inner.started.lock().unwrap().clone();
        started.sort();
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
    }
}
