//! Bounded retry with exponential backoff and jitter.
//!
//! Only transient failures (see [`ProviderError::is_transient`]) are retried.
//! For streaming, only establishing the stream is retried: once chunks have
//! been handed to the caller a failure is final.

use async_trait::async_trait;
use rand::Rng;
use settlr_core::error::ProviderError;
use settlr_core::provider::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Longest single wait between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Wait before retry number `attempt` (0-based): doubled per attempt,
    /// capped, plus up to 50% random jitter. A rate limit's `retry-after`
    /// is honored as a floor.
    fn delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF);
        let jitter_ms = (base.as_millis() as u64) / 2;
        let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
        let delay = base + jitter;

        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                delay.max(Duration::from_secs(*retry_after_secs))
            }
            _ => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// A provider that retries transient failures of the provider it wraps.
pub struct RetryProvider {
    inner: Arc<dyn settlr_core::Provider>,
    policy: RetryPolicy,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn settlr_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retries<T, F, Fut>(&self, op: &str, mut attempt_fn: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(provider = %self.inner.name(), op, attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt, &e);
                    warn!(
                        provider = %self.inner.name(),
                        op,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl settlr_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.with_retries("complete", || self.inner.complete(request.clone()))
            .await
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        self.with_retries("stream", || self.inner.stream(request.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settlr_core::Provider;
    use settlr_core::message::Message;
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct FlakyProvider {
        errors: Mutex<Vec<ProviderError>>,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(mut errors: Vec<ProviderError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl settlr_core::Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            if let Some(err) = self.errors.lock().unwrap().pop() {
                return Err(err);
            }
            Ok(ProviderResponse {
                message: Message::assistant("success"),
                usage: None,
                model: "test-model".into(),
            })
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest::new("test", vec![Message::user("hello")])
    }

    fn overloaded() -> ProviderError {
        ProviderError::ApiError {
            status_code: 529,
            message: "Overloaded".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let inner = Arc::new(FlakyProvider::new(vec![
            overloaded(),
            ProviderError::Network("reset".into()),
        ]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        let result = provider.complete(test_request()).await.unwrap();
        assert_eq!(result.message.content, "success");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(FlakyProvider::new(vec![overloaded(); 5]));
        let provider =
            RetryProvider::new(inner.clone(), RetryPolicy::new(2, Duration::from_millis(100)));

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 529, .. }));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_not_retried() {
        let inner = Arc::new(FlakyProvider::new(vec![ProviderError::AuthenticationFailed(
            "bad key".into(),
        )]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_establishment_is_retried() {
        let inner = Arc::new(FlakyProvider::new(vec![ProviderError::Timeout("slow".into())]));
        let provider = RetryProvider::new(inner.clone(), RetryPolicy::default());

        let mut rx = provider.stream(test_request()).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("success"));
        assert_eq!(inner.calls(), 2);
    }

    #[test]
    fn delay_grows_and_honors_retry_after() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let net = ProviderError::Network("x".into());

        let first = policy.delay(0, &net);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));

        let third = policy.delay(2, &net);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));

        let capped = policy.delay(20, &net);
        assert!(capped <= MAX_BACKOFF + MAX_BACKOFF / 2);

        let limited = policy.delay(0, &ProviderError::RateLimited { retry_after_secs: 7 });
        assert!(limited >= Duration::from_secs(7));
    }
}
