//! Resilience layer for calls to slow or failing downstream services.
//!
//! Breakwater combines three cooperating pieces:
//! - **Circuit Breaker**: trips open after consecutive failures and fails
//!   subsequent calls fast, admitting a single recovery probe after a
//!   cooldown
//! - **Retry Executor**: drives a protected operation with pluggable backoff
//!   and retry policies, gating every attempt through the breaker
//! - **Fallback Router**: turns terminal failures into safe, self-describing
//!   responses that preserve the originating request's metadata
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use breakwater::{
//!     policies, CircuitBreaker, CircuitBreakerConfig, FallbackRouter, Request, RetryConfig,
//!     RetryExecutor,
//! };
//!
//! # #[derive(Debug, thiserror::Error)]
//! # #[error("boom")]
//! # struct MyError;
//! # async fn run() -> Result<(), breakwater::ConfigError> {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new()
//!         .failure_threshold(3)
//!         .half_open_after(Duration::from_millis(500))
//!         .build()?,
//! )?;
//!
//! let config = RetryConfig::new().fixed_backoff(Duration::from_millis(100)).build()?;
//! let executor =
//!     RetryExecutor::new(config, policies::AlwaysRetry, breaker, FallbackRouter::new());
//!
//! let outcome = executor
//!     .execute(Request::new("world".to_string()), |req| {
//!         let name = req.payload().clone();
//!         async move { Ok::<_, MyError>(format!("Hello {name}")) }
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod circuit_breaker;
pub mod error;
pub mod fallback;
pub mod message;
pub mod retry;
pub mod serde_util;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitState, Clock, MockClock,
    SystemClock,
};
// Re-export error types
pub use error::{CircuitOpenError, ConfigError, ConfigResult, Failure, FailureKind};
// Re-export fallback types
pub use fallback::{FallbackResult, FallbackRouter, DEFAULT_FALLBACK_PREFIX};
// Re-export message types
pub use message::{Request, RequestHeaders};
// Re-export retry types
pub use retry::{
    policies, BackoffPolicy, Jitter, Outcome, RetryConfig, RetryConfigBuilder, RetryDecision,
    RetryExecutor, RetryPolicy,
};
// Re-export serde helpers
pub use serde_util::duration_millis;
