//! Resilient model caller: per-backend retries, then primary → fallback failover.
//!
//! Every operation is tried against the primary backend up to
//! `RetryConfig::max_attempts` times with exponential backoff and jitter
//! between attempts. Once the primary is exhausted the same policy is applied
//! to the fallback. Only when both are exhausted does the call fail, with the
//! message of every attempt collected into `LlmError::Exhausted`.

use crate::brain::LlmProvider;
use crate::config::RetryConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which slot of the caller a backend occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    Primary,
    Fallback,
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendRole::Primary => write!(f, "Primary"),
            BackendRole::Fallback => write!(f, "Fallback"),
        }
    }
}

/// Runs operations against a primary backend with retry and failover.
pub struct ResilientCaller {
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
    retry: RetryConfig,
}

impl ResilientCaller {
    pub fn new(
        primary: Arc<dyn LlmProvider>,
        fallback: Option<Arc<dyn LlmProvider>>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            retry,
        }
    }

    fn backends(&self) -> Vec<(BackendRole, Arc<dyn LlmProvider>)> {
        let mut backends = vec![(BackendRole::Primary, Arc::clone(&self.primary))];
        if let Some(fallback) = &self.fallback {
            backends.push((BackendRole::Fallback, Arc::clone(fallback)));
        }
        backends
    }

    /// Run `operation` with retry and failover.
    ///
    /// The operation receives the backend to use for this attempt and may be
    /// called up to `2 * max_attempts` times, so it must be safe to repeat.
    pub async fn invoke<F, Fut, T, E>(&self, operation: F) -> Result<T, LlmError>
    where
        F: Fn(Arc<dyn LlmProvider>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut failures = Vec::new();

        for (role, backend) in self.backends() {
            for attempt in 0..max_attempts {
                match operation(Arc::clone(&backend)).await {
                    Ok(value) => {
                        if role == BackendRole::Fallback || attempt > 0 {
                            info!(
                                backend = %role,
                                model = backend.model_name(),
                                attempt = attempt + 1,
                                "Model call recovered"
                            );
                        }
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(
                            backend = %role,
                            model = backend.model_name(),
                            attempt = attempt + 1,
                            max = max_attempts,
                            error = %e,
                            "Model attempt failed"
                        );
                        failures.push(format!("{} model attempt {} failed: {}", role, attempt + 1, e));

                        if attempt + 1 < max_attempts {
                            let delay = compute_backoff(&self.retry, attempt);
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }
            }
            if role == BackendRole::Primary && self.fallback.is_some() {
                warn!(
                    model = backend.model_name(),
                    "Primary backend exhausted, switching to fallback"
                );
            }
        }

        Err(LlmError::Exhausted {
            attempts: failures,
        })
    }

    /// Plain completion with retry and failover.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.invoke(|backend| {
            let request = request.clone();
            async move { backend.complete(request).await }
        })
        .await
    }
}

/// Exponential backoff capped at `max_backoff_ms`, plus uniform jitter.
pub fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64).max(0.0) as u64;
    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use pretty_assertions::assert_eq;

    fn failing(n: usize, label: &str) -> Arc<MockLlmProvider> {
        let mock = MockLlmProvider::named(label);
        for i in 0..n {
            mock.queue_error(LlmError::Connection {
                message: format!("{label} down {}", i + 1),
            });
        }
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_first_attempt_success_makes_one_call() {
        let primary = Arc::new(MockLlmProvider::with_response("ok"));
        let caller = ResilientCaller::new(primary.clone(), None, RetryConfig::immediate(3));
        let resp = caller.complete(CompletionRequest::prompt("q")).await.unwrap();
        assert_eq!(resp.text, "ok");
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_primary_before_failover() {
        let primary = failing(2, "primary");
        primary.queue_response(MockLlmProvider::text_response("third time"));
        let fallback = Arc::new(MockLlmProvider::with_response("fallback"));
        let caller = ResilientCaller::new(
            primary.clone(),
            Some(fallback.clone()),
            RetryConfig::immediate(3),
        );

        let resp = caller.complete(CompletionRequest::prompt("q")).await.unwrap();
        assert_eq!(resp.text, "third time");
        assert_eq!(primary.call_count(), 3);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fails_over_after_primary_exhausted() {
        let primary = failing(3, "primary");
        let fallback = failing(1, "fallback");
        fallback.queue_response(MockLlmProvider::text_response("rescued"));
        let caller = ResilientCaller::new(
            primary.clone(),
            Some(fallback.clone()),
            RetryConfig::immediate(3),
        );

        let resp = caller.complete(CompletionRequest::prompt("q")).await.unwrap();
        assert_eq!(resp.text, "rescued");
        assert_eq!(primary.call_count(), 3);
        assert_eq!(fallback.call_count(), 2);
    }

    #[tokio::test]
    async fn test_aggregates_every_attempt_when_both_exhausted() {
        let primary = failing(2, "primary");
        let fallback = failing(2, "fallback");
        let caller = ResilientCaller::new(primary, Some(fallback), RetryConfig::immediate(2));

        let err = caller
            .complete(CompletionRequest::prompt("q"))
            .await
            .unwrap_err();
        match err {
            LlmError::Exhausted { attempts } => assert_eq!(
                attempts,
                vec![
                    "Primary model attempt 1 failed: Provider connection failed: primary down 1",
                    "Primary model attempt 2 failed: Provider connection failed: primary down 2",
                    "Fallback model attempt 1 failed: Provider connection failed: fallback down 1",
                    "Fallback model attempt 2 failed: Provider connection failed: fallback down 2",
                ]
            ),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_accepts_foreign_error_types() {
        let primary = Arc::new(MockLlmProvider::new());
        let caller = ResilientCaller::new(primary, None, RetryConfig::immediate(2));
        let err = caller
            .invoke(|_backend| async { Err::<(), _>("agent crashed") })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Primary model attempt 2 failed: agent crashed"));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            backoff_multiplier: 2.0,
            jitter_ms: 0,
        };
        assert_eq!(compute_backoff(&config, 0), Duration::from_millis(100));
        assert_eq!(compute_backoff(&config, 1), Duration::from_millis(200));
        assert_eq!(compute_backoff(&config, 2), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let config = RetryConfig {
            jitter_ms: 1_000,
            ..RetryConfig::default()
        };
        for _ in 0..20 {
            let delay = compute_backoff(&config, 0);
            assert!(delay >= Duration::from_millis(2_000));
            assert!(delay <= Duration::from_millis(3_000));
        }
    }
}
