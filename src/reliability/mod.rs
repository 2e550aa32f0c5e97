//! Resilience primitives for store access.
//!
//! Every mutating record-store or blob-store call goes through
//! [`RetryExecutor`], which checks store liveness, retries transient failures
//! with exponential backoff and reports exhausted operations as enriched
//! [`StoreFailure`](crate::error::StoreFailure)s.

pub mod retry;

pub use retry::{AlwaysHealthy, HealthCheck, RetryConfig, RetryExecutor, RetryOutcome};
