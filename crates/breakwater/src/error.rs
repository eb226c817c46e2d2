//! Error types shared across the resilience primitives
//!
//! The failure taxonomy distinguishes errors produced by the protected
//! operation from denials synthesized by the circuit breaker. The two cases
//! are separate variants of [`Failure`], so downstream code can branch on
//! structure instead of matching error text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Denial issued by the circuit breaker when it refuses a call
///
/// Only [`CircuitBreaker::permit`](crate::CircuitBreaker::permit) produces
/// this error. It is terminal for the call that received it: the retry
/// policy is never consulted about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Circuit breaker is open, rejecting calls")]
pub struct CircuitOpenError;

/// Terminal failure of a protected call
///
/// This error type is generic over the underlying operation error type `E`,
/// preserving the original error as a `#[source]` while keeping the
/// circuit-breaker denial a structurally distinct case.
#[derive(Debug, Error)]
pub enum Failure<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The protected operation itself failed
    #[error("Operation failed: {source}")]
    Operation {
        #[source]
        source: E,
    },

    /// The circuit breaker denied the call
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl<E> Failure<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Structural discriminant of this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Operation { .. } => FailureKind::Operation,
            Failure::CircuitOpen(_) => FailureKind::CircuitOpen,
        }
    }

    /// Returns `true` if this failure is a circuit-breaker denial
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Failure::CircuitOpen(_))
    }

    /// Consume the failure and return the operation error, if any
    pub fn into_operation(self) -> Option<E> {
        match self {
            Failure::Operation { source } => Some(source),
            Failure::CircuitOpen(_) => None,
        }
    }
}

/// Discriminant carried into fallback results
///
/// Lets a consumer of a fallback payload tell an exhausted operation failure
/// from a circuit denial without parsing the description text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The protected operation failed
    Operation,
    /// The circuit breaker denied the call
    CircuitOpen,
}
