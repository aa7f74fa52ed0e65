//! Retry Logic for Model Providers
//!
//! Implements exponential backoff with jitter for transient failures. Retrying
//! is a deployment policy layered around a provider; the workflow engine itself
//! never retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{ModelError, ModelInfo, ModelProvider, ModelRequest, ModelResponse};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 = no retry)
    pub max_attempts: usize,
    /// Initial delay before first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Three attempts with the default backoff
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            ..Default::default()
        }
    }

    /// Builder: set max attempts
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Builder: set max delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Builder: set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Builder: enable/disable jitter
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let clamped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.add_jitter {
            // Add up to 25% jitter
            let jitter = clamped_delay * 0.25 * rand_jitter();
            clamped_delay + jitter
        } else {
            clamped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0)
fn rand_jitter() -> f64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEED: AtomicU64 = AtomicU64::new(0);

    // LCG parameters
    const A: u64 = 1103515245;
    const C: u64 = 12345;
    const M: u64 = 1 << 31;

    let seed = SEED.fetch_add(1, Ordering::Relaxed);
    let time_component = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let combined = seed.wrapping_add(time_component);
    let next = (A.wrapping_mul(combined).wrapping_add(C)) % M;

    (next as f64) / (M as f64)
}

/// Retry state tracker
#[derive(Debug)]
pub struct RetryState {
    config: RetryConfig,
    attempt: usize,
    last_error: Option<String>,
}

impl RetryState {
    /// Create a new retry state
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_error: None,
        }
    }

    /// Check if another attempt is allowed
    pub fn should_retry(&self) -> bool {
        self.attempt < self.config.max_attempts
    }

    /// Record a failed attempt
    pub fn record_attempt(&mut self, error: impl Into<String>) {
        self.attempt += 1;
        self.last_error = Some(error.into());
    }

    /// Get the delay before next retry
    pub fn next_delay(&self) -> Duration {
        self.config.delay_for_attempt(self.attempt.saturating_sub(1))
    }

    /// Get current attempt number (1-indexed)
    pub fn current_attempt(&self) -> usize {
        self.attempt
    }

    /// Get remaining attempts
    pub fn remaining_attempts(&self) -> usize {
        self.config.max_attempts.saturating_sub(self.attempt)
    }

    /// Get the last error
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Execute an async operation, retrying while `is_retryable` accepts the error
pub async fn with_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut state = RetryState::new(config.clone());

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                state.record_attempt(e.to_string());

                if !is_retryable(&e) || !state.should_retry() {
                    return Err(e);
                }

                let delay = state.next_delay();
                tracing::warn!(
                    attempt = state.current_attempt(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// A provider wrapper that retries retryable [`ModelError`]s.
pub struct RetryingProvider {
    inner: Arc<dyn ModelProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn ModelProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ModelProvider for RetryingProvider {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        with_retry(&self.config, ModelError::is_retryable, || {
            super::invoke_with_deadline(self.inner.as_ref(), request)
        })
        .await
    }

    fn model_info(&self) -> ModelInfo {
        self.inner.model_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
        failures: usize,
        kind: ModelErrorKind,
    }

    #[async_trait]
    impl ModelProvider for FlakyProvider {
        async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ModelError::new(self.kind, "flaky"))
            } else {
                Ok(ModelResponse::text("ok"))
            }
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 1);
        assert!(config.add_jitter);
        assert_eq!(RetryConfig::standard().max_attempts, 3);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::default().with_jitter(false);

        // Exponential backoff: 500ms, 1000ms, 2000ms
        assert_eq!(config.delay_for_attempt(0).as_millis(), 500);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 2000);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::default()
            .with_jitter(false)
            .with_max_delay(Duration::from_secs(1));

        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_state() {
        let config = RetryConfig::default().with_max_attempts(3);
        let mut state = RetryState::new(config);

        assert!(state.should_retry());
        assert_eq!(state.remaining_attempts(), 3);

        state.record_attempt("error 1");
        state.record_attempt("error 2");
        assert!(state.should_retry());
        assert_eq!(state.remaining_attempts(), 1);

        state.record_attempt("error 3");
        assert!(!state.should_retry());
        assert_eq!(state.last_error(), Some("error 3"));
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        let attempts = AtomicUsize::new(0);
        let config = RetryConfig::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(10));

        let result = with_retry(&config, |_: &&str| true, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err("transient error")
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_fatal_error() {
        let attempts = AtomicUsize::new(0);
        let config = RetryConfig::standard().with_initial_delay(Duration::from_millis(1));

        let result: Result<(), &str> = with_retry(&config, |_: &&str| false, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrying_provider_retries_rate_limits() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 2,
            kind: ModelErrorKind::RateLimited,
        });
        let provider = RetryingProvider::new(
            inner.clone(),
            RetryConfig::standard().with_initial_delay(Duration::from_millis(1)),
        );

        let response = provider.invoke(&ModelRequest::from_prompt("hi")).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_provider_does_not_retry_auth_failures() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 5,
            kind: ModelErrorKind::Authentication,
        });
        let provider = RetryingProvider::new(inner.clone(), RetryConfig::standard());

        let err = provider.invoke(&ModelRequest::from_prompt("hi")).await.unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Authentication);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
