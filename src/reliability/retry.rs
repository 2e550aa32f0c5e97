//! Retry with exponential backoff for store operations.
//!
//! The delay schedule comes from `backon`; the loop itself is explicit because
//! each attempt is preceded by a liveness check and failures are classified
//! into retryable, fatal and caller-facing errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use workbench::reliability::{RetryConfig, RetryExecutor};
//!
//! let retry = RetryExecutor::new(RetryConfig::default())
//!     .with_health_check(Arc::new(db.clone()));
//! let node = retry
//!     .with_retry("file_nodes.insert", &format!("project={project_id}"), || {
//!         repo.insert(&new_node)
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::StoreFailure;
use crate::{Result, WorkbenchError};

/// Longest exponent used when computing the backoff cap.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubled after each further failure.
    pub base_delay: Duration,
    /// When false every operation is attempted exactly once.
    pub enable_retry: bool,
    /// Upper bound of the uniform random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            enable_retry: true,
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// Config that attempts every operation once.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_retry: false,
            ..Self::default()
        }
    }

    /// Set maximum number of attempts.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the jitter bound.
    #[must_use]
    pub const fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Number of attempts an operation gets.
    pub fn max_attempts(&self) -> u32 {
        if self.enable_retry {
            self.max_retries.max(1)
        } else {
            1
        }
    }

    /// Build the exponential backoff schedule: `base_delay * 2^(k-1)` after
    /// the k-th failed attempt, one entry per retry.
    fn build_backoff(&self) -> ExponentialBuilder {
        let retries = self.max_attempts() - 1;
        let cap = self
            .base_delay
            .saturating_mul(1u32 << retries.min(MAX_BACKOFF_EXPONENT));

        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(cap)
            .with_factor(2.0)
            .with_max_times(retries as usize)
    }

    /// Draw a jitter term in `[0, max_jitter]`.
    fn jitter(&self) -> Duration {
        let bound = self.max_jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=bound))
    }
}

/// Liveness probe consulted before every attempt.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Whether the store can currently be reached.
    async fn is_healthy(&self) -> bool;
}

/// Health check that always reports a reachable store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl HealthCheck for AlwaysHealthy {
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Successful result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// The value returned by the operation.
    pub value: T,
    /// How many attempts it took.
    pub attempts: u32,
}

/// Runs store operations under the retry policy.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    health: Arc<dyn HealthCheck>,
}

impl RetryExecutor {
    /// Create an executor that assumes the store is always reachable.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            health: Arc::new(AlwaysHealthy),
        }
    }

    /// Use the given liveness probe before each attempt.
    #[must_use]
    pub fn with_health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = health;
        self
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` under the retry policy and return its value.
    ///
    /// `operation` names the call for logs and failures; `context` describes
    /// the entity being touched (may be empty).
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, context: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(operation, context, op)
            .await
            .map(|outcome| outcome.value)
    }

    /// Run `op` under the retry policy and report how many attempts it took.
    ///
    /// Caller-facing errors (`NotFound`, `NameConflict`, ...) are returned
    /// unchanged after one attempt. Store errors come back wrapped in
    /// `StoreFatal`, `StoreTransient` or `StoreUnavailable`.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        context: &str,
        mut op: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut backoff = self.config.build_backoff().build();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = if self.health.is_healthy().await {
                op().await
            } else {
                Err(WorkbenchError::DatabaseConnection(
                    "record store is not reachable".to_string(),
                ))
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = %operation,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if err.is_domain() {
                return Err(err);
            }

            if !err.is_retryable() {
                debug!(
                    operation = %operation,
                    error = %err,
                    "Permanent error, not retrying"
                );
                return Err(failure(operation, context, attempt, false, err));
            }

            match backoff.next() {
                Some(delay) => {
                    let delay = delay + self.config.jitter();
                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        next_delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(
                        operation = %operation,
                        attempts = attempt,
                        error = %err,
                        "Max retries exhausted"
                    );
                    return Err(failure(operation, context, attempt, true, err));
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Wrap the last error of an operation into the matching store failure.
fn failure(
    operation: &str,
    context: &str,
    attempts: u32,
    retryable: bool,
    source: WorkbenchError,
) -> WorkbenchError {
    let connectivity = source.is_connectivity();
    let failure = Box::new(StoreFailure {
        operation: operation.to_string(),
        attempts,
        retryable,
        context: (!context.is_empty()).then(|| context.to_string()),
        source: Box::new(source),
    });

    if !retryable {
        WorkbenchError::StoreFatal(failure)
    } else if connectivity {
        WorkbenchError::StoreUnavailable(failure)
    } else {
        WorkbenchError::StoreTransient(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_jitter(Duration::ZERO)
    }

    fn busy() -> WorkbenchError {
        WorkbenchError::DatabaseBusy("database is locked".to_string())
    }

    /// Reports unhealthy for the first `failures` probes.
    struct FlakyHealth {
        probes: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl HealthCheck for FlakyHealth {
        async fn is_healthy(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst) >= self.failures
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_jitter, Duration::from_millis(1000));
        assert!(config.enable_retry);
        assert_eq!(config.max_attempts(), 3);
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(RetryConfig::disabled().max_attempts(), 1);
        assert_eq!(RetryConfig::default().with_max_retries(0).max_attempts(), 1);
        assert_eq!(RetryConfig::default().with_max_retries(5).max_attempts(), 5);
    }

    #[test]
    fn test_backoff_schedule_doubles() {
        let config = RetryConfig::default()
            .with_max_retries(4)
            .with_base_delay(Duration::from_millis(100));

        let delays: Vec<Duration> = config.build_backoff().build().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn test_backoff_empty_when_disabled() {
        let delays: Vec<Duration> = RetryConfig::disabled().build_backoff().build().collect();
        assert!(delays.is_empty());
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig::default().with_max_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            assert!(config.jitter() <= Duration::from_millis(50));
        }
        assert_eq!(fast_config().jitter(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let executor = RetryExecutor::new(fast_config());

        let outcome = executor
            .execute("op", "", || async { Ok::<_, WorkbenchError>(42) })
            .await
            .unwrap();

        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let outcome = executor
            .execute("file_nodes.insert", "", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(busy())
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "done");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_raised_after_one_attempt() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = executor
            .with_retry("file_nodes.update", "node=abc", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkbenchError::Database("no such column: nme".to_string()))
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        match result {
            Err(WorkbenchError::StoreFatal(failure)) => {
                assert_eq!(failure.attempts, 1);
                assert!(!failure.retryable);
                assert_eq!(failure.operation, "file_nodes.update");
                assert_eq!(failure.context.as_deref(), Some("node=abc"));
                assert!(matches!(*failure.source, WorkbenchError::Database(_)));
            }
            other => panic!("Expected StoreFatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = executor
            .with_retry("blobs.put", "", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(busy())
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match result {
            Err(WorkbenchError::StoreTransient(failure)) => {
                assert_eq!(failure.attempts, 3);
                assert!(failure.retryable);
                assert!(failure.context.is_none());
            }
            other => panic!("Expected StoreTransient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_errors_surface_as_unavailable() {
        let executor = RetryExecutor::new(fast_config().with_max_retries(2));

        let result: Result<()> = executor
            .with_retry("projects.get", "", || async {
                Err(WorkbenchError::DatabaseConnection("connection refused".to_string()))
            })
            .await;

        match result {
            Err(WorkbenchError::StoreUnavailable(failure)) => assert_eq!(failure.attempts, 2),
            other => panic!("Expected StoreUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_domain_errors_pass_through() {
        let executor = RetryExecutor::new(fast_config());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = executor
            .with_retry("file_nodes.get", "", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkbenchError::NotFound("node".to_string()))
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(WorkbenchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_disabled_retry_attempts_once() {
        let executor = RetryExecutor::new(RetryConfig::disabled());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = executor
            .with_retry("op", "", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(busy())
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().attempts(), Some(1));
    }

    #[tokio::test]
    async fn test_unhealthy_store_never_runs_operation() {
        let executor = RetryExecutor::new(fast_config()).with_health_check(Arc::new(FlakyHealth {
            probes: AtomicU32::new(0),
            failures: u32::MAX,
        }));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = executor
            .with_retry("op", "", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        match result {
            Err(WorkbenchError::StoreUnavailable(failure)) => assert_eq!(failure.attempts, 3),
            other => panic!("Expected StoreUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recovers_when_store_comes_back() {
        let executor = RetryExecutor::new(fast_config()).with_health_check(Arc::new(FlakyHealth {
            probes: AtomicU32::new(0),
            failures: 1,
        }));

        let outcome = executor
            .execute("op", "", || async { Ok::<_, WorkbenchError>(7) })
            .await
            .unwrap();

        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.attempts, 2);
    }
}
