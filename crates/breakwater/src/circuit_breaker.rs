//! Circuit breaker state machine protecting a downstream service
//!
//! The breaker watches consecutive failures of a protected operation and
//! trips open once a threshold is reached, failing subsequent calls fast.
//! After a cooldown it admits a single recovery probe; the probe's outcome
//! decides whether the circuit closes again or re-opens for another
//! cooldown.
//!
//! All mutable state lives behind one mutex, so the lazy `Open -> HalfOpen`
//! transition and the admission of the probe happen as a single step. Under
//! concurrent callers exactly `half_open_max_probes` of them win the probe
//! slot; everyone else is denied.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{CircuitOpenError, ConfigError, ConfigResult};
use crate::serde_util::duration_millis;

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// This trait allows circuit breakers to use real system time in production
/// and controlled mock time in tests, enabling deterministic testing of
/// cooldown behavior without actual time delays.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Allows tests to control time progression without actual delays, enabling
/// fast and reliable testing of cooldown-based behavior.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Create a new mock clock with a specific start time
    pub fn with_current_time(start: Instant) -> Self {
        Self { start, elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by milliseconds (convenience method)
    ///
    /// Equivalent to `advance(Duration::from_millis(millis))`.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + *self.elapsed.lock()
    }
}

//==============================================================================
// State and Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a recovery probe
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait before an open circuit admits a recovery probe
    #[serde(with = "duration_millis")]
    pub half_open_after: Duration,
    /// Maximum number of in-flight probes allowed while half-open
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            half_open_after: Duration::from_secs(30),
            half_open_max_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with validation
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Create a configuration builder (alias for `new()`)
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.half_open_after.is_zero() {
            return Err(ConfigError::Invalid {
                message: "half_open_after must be greater than 0".to_string(),
            });
        }

        if self.half_open_max_probes == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_max_probes must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn half_open_after(mut self, cooldown: Duration) -> Self {
        self.config.half_open_after = cooldown;
        self
    }

    pub fn half_open_max_probes(mut self, max_probes: u32) -> Self {
        self.config.half_open_max_probes = max_probes;
        self
    }

    /// Set a custom clock for the circuit breaker (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with custom clock that builds a CircuitBreaker directly
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn half_open_after(mut self, cooldown: Duration) -> Self {
        self.config.half_open_after = cooldown;
        self
    }

    pub fn half_open_max_probes(mut self, max_probes: u32) -> Self {
        self.config.half_open_max_probes = max_probes;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_denials: u64,
    pub opened_at: Option<Instant>,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Mutable core guarded by the breaker's mutex.
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    total_successes: u64,
    total_failures: u64,
    total_denials: u64,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probes_in_flight: 0,
            total_successes: 0,
            total_failures: 0,
            total_denials: 0,
        }
    }
}

/// Consecutive-failure circuit breaker
///
/// One instance protects one downstream operation. Clones share state, so a
/// cloned handle can be moved into each concurrent caller. All transitions
/// are linearizable: the cooldown check, the `Open -> HalfOpen` transition,
/// and probe admission happen under a single lock acquisition inside
/// [`permit`](Self::permit).
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    core: Arc<Mutex<BreakerCore>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &core.state)
            .field("consecutive_failures", &core.consecutive_failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            core: Arc::clone(&self.core),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using system
    /// clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker using the builder pattern
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self { config, core: Arc::new(Mutex::new(BreakerCore::new())), clock: Arc::new(clock) })
    }

    /// Ask the breaker whether a call may proceed
    ///
    /// - `Closed`: always permitted.
    /// - `Open`: denied until the cooldown elapses; the first caller after
    ///   the cooldown transitions the circuit to half-open and is admitted
    ///   as the recovery probe in the same step.
    /// - `HalfOpen`: permitted only while fewer than
    ///   `half_open_max_probes` probes are in flight.
    ///
    /// A denial is terminal for the call that received it; the caller routes
    /// it to fallback rather than retrying.
    #[instrument(skip(self))]
    pub fn permit(&self) -> Result<(), CircuitOpenError> {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = core.opened_at.is_some_and(|opened| {
                    self.clock.now().duration_since(opened) >= self.config.half_open_after
                });
                if cooled_down {
                    core.state = CircuitState::HalfOpen;
                    core.probes_in_flight = 1;
                    info!("Circuit breaker half-open, admitting recovery probe");
                    Ok(())
                } else {
                    core.total_denials += 1;
                    debug!("Circuit breaker rejecting call - state: OPEN");
                    Err(CircuitOpenError)
                }
            }
            CircuitState::HalfOpen => {
                if core.probes_in_flight < self.config.half_open_max_probes {
                    core.probes_in_flight += 1;
                    Ok(())
                } else {
                    core.total_denials += 1;
                    debug!("Circuit breaker rejecting call - state: HALF_OPEN, probe in flight");
                    Err(CircuitOpenError)
                }
            }
        }
    }

    /// Record a successful operation
    ///
    /// Resets the consecutive failure count regardless of state. A success
    /// while half-open closes the circuit.
    pub fn on_success(&self) {
        let mut core = self.core.lock();
        core.total_successes += 1;
        core.consecutive_failures = 0;

        match core.state {
            CircuitState::HalfOpen => {
                core.state = CircuitState::Closed;
                core.opened_at = None;
                core.probes_in_flight = 0;
                info!("Circuit breaker closed after successful recovery probe");
            }
            CircuitState::Open => {
                warn!("Received success while circuit is open");
            }
            CircuitState::Closed => {}
        }
    }

    /// Record a failed operation
    ///
    /// While closed, increments the consecutive failure count and opens the
    /// circuit when it reaches the threshold. While half-open, re-opens
    /// immediately and restarts the cooldown. While open, only the
    /// cumulative counter moves; the consecutive count stays frozen.
    pub fn on_failure(&self) {
        let mut core = self.core.lock();
        core.total_failures += 1;

        match core.state {
            CircuitState::Closed => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.config.failure_threshold {
                    core.state = CircuitState::Open;
                    core.opened_at = Some(self.clock.now());
                    warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        core.consecutive_failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                core.consecutive_failures += 1;
                core.state = CircuitState::Open;
                core.opened_at = Some(self.clock.now());
                core.probes_in_flight = 0;
                warn!("Circuit breaker reopened after failed recovery probe");
            }
            CircuitState::Open => {
                // Late report from a call admitted before the trip.
            }
        }
    }

    /// Get the current circuit state
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let core = self.core.lock();
        CircuitBreakerMetrics {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            total_successes: core.total_successes,
            total_failures: core.total_failures,
            total_denials: core.total_denials,
            opened_at: core.opened_at,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut core = self.core.lock();
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.opened_at = None;
        core.probes_in_flight = 0;
        info!("Circuit breaker manually reset to closed state");
    }

    /// The configuration this breaker was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            core: Arc::new(Mutex::new(BreakerCore::new())),
            clock: Arc::new(SystemClock),
        }
    }
}
