//! Fallback routing for calls that cannot succeed
//!
//! When the retry loop terminates without a response, the router turns the
//! terminal failure into a [`FallbackResult`]: a safe, self-describing
//! payload the caller hands to its delivery boundary instead of surfacing a
//! raw error. Routing is pure; the router performs no I/O.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Failure, FailureKind};
use crate::message::RequestHeaders;

/// Default description prefix for fallback results
pub const DEFAULT_FALLBACK_PREFIX: &str = "The service is not available at the moment: ";

/// Safe response produced when the protected call cannot succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackResult {
    /// Human-readable account of the terminal failure
    pub description: String,
    /// Structural discriminant of the terminal failure
    pub kind: FailureKind,
    /// Headers cloned unchanged from the originating request
    pub headers: RequestHeaders,
    /// Number of operation invocations made before giving up
    pub attempts: u32,
}

/// Turns terminal failures into fallback results
///
/// The description embeds the failure's rendering behind a configurable
/// prefix, so an open-circuit denial and an exhausted operation failure stay
/// textually distinguishable. Request headers pass through unchanged: the
/// correlation id and reply target let the consumer route the result back
/// to whoever asked.
#[derive(Debug, Clone)]
pub struct FallbackRouter {
    prefix: String,
}

impl FallbackRouter {
    /// Create a router with the default description prefix
    pub fn new() -> Self {
        Self { prefix: DEFAULT_FALLBACK_PREFIX.to_string() }
    }

    /// Create a router with a custom description prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Build the fallback result for a terminal failure
    pub fn route<E>(
        &self,
        headers: &RequestHeaders,
        failure: &Failure<E>,
        attempts: u32,
    ) -> FallbackResult
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let kind = failure.kind();
        warn!(
            correlation_id = %headers.correlation_id,
            kind = ?kind,
            attempts,
            "Routing failed request to fallback"
        );

        FallbackResult {
            description: format!("{}{}", self.prefix, failure),
            kind,
            headers: headers.clone(),
            attempts,
        }
    }
}

impl Default for FallbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for fallback routing
    //!
    //! Tests cover description formatting for both failure kinds, prefix
    //! overrides, and header preservation.

    use thiserror::Error;

    use super::*;
    use crate::error::CircuitOpenError;

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct TestError;

    /// Validates `FallbackRouter::route` behavior for the operation failure
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the description carries the default prefix and the
    ///   operation error's message.
    /// - Confirms `result.kind` equals `FailureKind::Operation`.
    #[test]
    fn test_route_operation_failure() {
        let router = FallbackRouter::new();
        let headers = RequestHeaders::new();
        let failure: Failure<TestError> = Failure::Operation { source: TestError };

        let result = router.route(&headers, &failure, 3);

        assert_eq!(
            result.description,
            "The service is not available at the moment: Operation failed: connection refused"
        );
        assert_eq!(result.kind, FailureKind::Operation);
        assert_eq!(result.attempts, 3);
    }

    /// Validates `FallbackRouter::route` behavior for the circuit open
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the description names the open circuit.
    /// - Confirms `result.kind` equals `FailureKind::CircuitOpen`.
    #[test]
    fn test_route_circuit_open() {
        let router = FallbackRouter::new();
        let headers = RequestHeaders::new();
        let failure: Failure<TestError> = CircuitOpenError.into();

        let result = router.route(&headers, &failure, 0);

        assert_eq!(
            result.description,
            "The service is not available at the moment: Circuit breaker is open, rejecting calls"
        );
        assert_eq!(result.kind, FailureKind::CircuitOpen);
        assert_eq!(result.attempts, 0);
    }

    /// Tests that the two terminal causes produce distinguishable results
    #[test]
    fn test_terminal_causes_distinguishable() {
        let router = FallbackRouter::new();
        let headers = RequestHeaders::new();

        let operation: Failure<TestError> = Failure::Operation { source: TestError };
        let open: Failure<TestError> = CircuitOpenError.into();

        let a = router.route(&headers, &operation, 3);
        let b = router.route(&headers, &open, 0);

        assert_ne!(a.kind, b.kind);
        assert_ne!(a.description, b.description);
    }

    /// Tests that a custom prefix replaces the default
    #[test]
    fn test_custom_prefix() {
        let router = FallbackRouter::with_prefix("Unavailable: ");
        let headers = RequestHeaders::new();
        let failure: Failure<TestError> = Failure::Operation { source: TestError };

        let result = router.route(&headers, &failure, 1);
        assert!(result.description.starts_with("Unavailable: "));
    }

    /// Validates `FallbackRouter::route` behavior for the header
    /// preservation scenario.
    ///
    /// Assertions:
    /// - Confirms the result's headers equal the request's headers.
    #[test]
    fn test_headers_preserved() {
        let router = FallbackRouter::new();
        let headers = RequestHeaders::new()
            .with_reply_to("replies")
            .with_attribute("tenant", "acme");
        let failure: Failure<TestError> = Failure::Operation { source: TestError };

        let result = router.route(&headers, &failure, 2);
        assert_eq!(result.headers, headers);
    }

    /// Validates `FallbackResult` serialization for the serde scenario.
    ///
    /// Assertions:
    /// - Confirms the serialized result round-trips unchanged.
    #[test]
    fn test_fallback_result_serde_round_trip() {
        let router = FallbackRouter::new();
        let headers = RequestHeaders::new();
        let failure: Failure<TestError> = CircuitOpenError.into();

        let result = router.route(&headers, &failure, 0);
        let json = serde_json::to_string(&result).expect("Should serialize");
        let back: FallbackResult = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(back, result);
    }
}
