//! Retry loop with pluggable backoff, policy, and fallback routing
//!
//! The executor drives a protected operation to completion: each attempt is
//! gated by the circuit breaker, failures are reported back to it, and the
//! configured policy decides whether to try again. The loop itself has no
//! attempt cap. With a policy that always retries, the breaker tripping open
//! is what ends the loop. Every terminating path yields an [`Outcome`]:
//! either the operation's response or a routed fallback, never a raw error.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::circuit_breaker::{CircuitBreaker, Clock, SystemClock};
use crate::error::{ConfigError, ConfigResult, Failure};
use crate::fallback::{FallbackResult, FallbackRouter};
use crate::message::Request;

//==============================================================================
// Backoff and Jitter
//==============================================================================

/// Backoff policy for calculating retry delays
///
/// Attempt indices are 1-based: `delay_for(1)` is the delay after the first
/// failed attempt.
#[derive(Debug, Clone, PartialEq)]
#[allow(unpredictable_function_pointer_comparisons)]
pub enum BackoffPolicy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt - 1) * increment
    Linear { initial_delay: Duration, increment: Duration },
    /// Exponential backoff: initial_delay * base^(attempt - 1), capped
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
    /// Custom backoff function over the 1-based attempt index
    Custom(fn(u32) -> Duration),
}

impl BackoffPolicy {
    /// Calculate the delay to wait after the given attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let completed = attempt.saturating_sub(1);
        match self {
            BackoffPolicy::Fixed(delay) => *delay,
            BackoffPolicy::Linear { initial_delay, increment } => {
                *initial_delay + increment.saturating_mul(completed)
            }
            BackoffPolicy::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_millis() as f64 * base.powi(completed as i32);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
            BackoffPolicy::Custom(f) => f(attempt),
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: 0 to calculated_delay
    Full,
    /// Equal jitter: calculated_delay/2 to calculated_delay
    Equal,
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=delay_ms)),
            Jitter::Equal => {
                let half = delay_ms / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=delay_ms - half))
            }
        }
    }
}

//==============================================================================
// Retry Policy
//==============================================================================

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry the operation with the configured backoff delay
    Retry,
    /// Retry the operation with a custom delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Trait for determining whether an operation error should be retried
///
/// The policy is only ever consulted with errors produced by the operation
/// itself. A circuit-breaker denial terminates the loop before any policy
/// call, whatever the policy would have said.
pub trait RetryPolicy<E> {
    /// Decide whether to retry after the given attempt (1-based) failed
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::*;

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry policy - never retries
    #[derive(Debug, Clone)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Predicate-based retry policy
    #[derive(Debug)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    /// Attempt-capped policy - retries until `max_attempts` have been made
    ///
    /// The executor's loop is unbounded; callers that want a hard attempt
    /// budget express it through this policy.
    #[derive(Debug, Clone)]
    pub struct LimitedRetry {
        pub max_attempts: u32,
    }

    impl LimitedRetry {
        pub fn new(max_attempts: u32) -> Self {
            Self { max_attempts }
        }
    }

    impl<E> RetryPolicy<E> for LimitedRetry {
        fn should_retry(&self, _error: &E, attempt: u32) -> RetryDecision {
            if attempt >= self.max_attempts {
                RetryDecision::Stop
            } else {
                RetryDecision::Retry
            }
        }
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Backoff policy for calculating delays
    pub backoff: BackoffPolicy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { backoff: BackoffPolicy::Fixed(Duration::from_millis(100)), jitter: Jitter::None }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with validation
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Create a configuration builder (alias for `new()`)
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        match &self.backoff {
            BackoffPolicy::Exponential { base, .. } if *base <= 0.0 => Err(ConfigError::Invalid {
                message: "exponential base must be greater than 0".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffPolicy::Fixed(delay);
        self
    }

    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffPolicy::Linear { initial_delay, increment };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffPolicy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn custom_backoff(mut self, f: fn(u32) -> Duration) -> Self {
        self.config.backoff = BackoffPolicy::Custom(f);
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn full_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Full;
        self
    }

    pub fn equal_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Equal;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Executor
//==============================================================================

/// Result of a protected execution
///
/// Terminal failures never escape as errors; they arrive as a routed
/// [`FallbackResult`].
#[derive(Debug)]
pub enum Outcome<S> {
    /// The operation produced a response
    Response(S),
    /// The call could not succeed; a fallback was routed instead
    Fallback(FallbackResult),
}

impl<S> Outcome<S> {
    /// Returns `true` if the outcome is a response
    pub fn is_response(&self) -> bool {
        matches!(self, Outcome::Response(_))
    }

    /// Returns `true` if the outcome is a fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback(_))
    }

    /// Consume the outcome and return the response, if any
    pub fn into_response(self) -> Option<S> {
        match self {
            Outcome::Response(response) => Some(response),
            Outcome::Fallback(_) => None,
        }
    }

    /// Consume the outcome and return the fallback result, if any
    pub fn into_fallback(self) -> Option<FallbackResult> {
        match self {
            Outcome::Response(_) => None,
            Outcome::Fallback(fallback) => Some(fallback),
        }
    }
}

/// The main retry executor
///
/// Owns a breaker handle (clones share state with the caller's handle), a
/// retry policy, and a fallback router. One `execute` call runs one request
/// to completion; the executor itself is stateless between calls and can be
/// shared freely.
pub struct RetryExecutor<P, C: Clock = SystemClock> {
    config: RetryConfig,
    policy: P,
    breaker: CircuitBreaker<C>,
    fallback: FallbackRouter,
}

impl<P, C: Clock> RetryExecutor<P, C> {
    /// Create a new retry executor
    pub fn new(
        config: RetryConfig,
        policy: P,
        breaker: CircuitBreaker<C>,
        fallback: FallbackRouter,
    ) -> Self {
        Self { config, policy, breaker, fallback }
    }

    /// The breaker handle this executor reports to
    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    /// Execute a request with retry, breaker gating, and fallback routing
    ///
    /// The loop for each attempt (1-based):
    /// 1. Ask the breaker for a permit. A denial is terminal: the
    ///    circuit-open failure goes straight to the fallback router.
    /// 2. Invoke the operation. On success, report it and return the
    ///    response.
    /// 3. On failure, report it, then consult the retry policy with the
    ///    operation error. `Stop` routes the failure to fallback;
    ///    `Retry`/`RetryAfter` sleeps out the delay and loops.
    #[instrument(
        skip(self, request, operation),
        fields(correlation_id = %request.headers().correlation_id)
    )]
    pub async fn execute<T, S, E, F, Fut>(
        &self,
        request: Request<T>,
        mut operation: F,
    ) -> Outcome<S>
    where
        P: RetryPolicy<E>,
        E: std::error::Error + Send + Sync + 'static,
        F: FnMut(&Request<T>) -> Fut,
        Fut: Future<Output = Result<S, E>>,
    {
        let mut attempt: u32 = 1;

        loop {
            if let Err(denied) = self.breaker.permit() {
                warn!(attempt, "Circuit breaker denied the call");
                let failure: Failure<E> = denied.into();
                // attempt - 1 invocations actually ran before the denial
                return Outcome::Fallback(self.fallback.route(
                    request.headers(),
                    &failure,
                    attempt - 1,
                ));
            }

            debug!(attempt, "Executing protected operation");
            match operation(&request).await {
                Ok(response) => {
                    self.breaker.on_success();
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}", attempt);
                    }
                    return Outcome::Response(response);
                }
                Err(error) => {
                    self.breaker.on_failure();
                    warn!(attempt, error = %error, "Protected operation failed");

                    match self.policy.should_retry(&error, attempt) {
                        RetryDecision::Stop => {
                            debug!("Retry policy determined not to retry");
                            let failure = Failure::Operation { source: error };
                            return Outcome::Fallback(self.fallback.route(
                                request.headers(),
                                &failure,
                                attempt,
                            ));
                        }
                        RetryDecision::Retry => {
                            let delay =
                                self.config.jitter.apply(self.config.backoff.delay_for(attempt));
                            debug!(attempt, ?delay, "Retrying after backoff");
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::RetryAfter(delay) => {
                            debug!(attempt, ?delay, "Retrying after policy-supplied delay");
                            tokio::time::sleep(delay).await;
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}
