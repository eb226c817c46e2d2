//! Comprehensive resilience benchmarks
//!
//! Benchmarks for circuit breaker and retry primitives including the breaker's
//! admission paths, state-machine transitions, executor outcomes, and backoff
//! calculations.
//!
//! Run with: `cargo bench --bench resilience_bench -p breakwater`

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use breakwater::{
    policies, BackoffPolicy, CircuitBreaker, CircuitBreakerConfig, FallbackRouter, Jitter,
    MockClock, Request, RetryConfig, RetryExecutor,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_admission_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_admission_paths");

    group.bench_function("permit_success", |b| {
        let breaker = CircuitBreaker::default();
        b.iter(|| {
            if let Err(err) = breaker.permit() {
                panic!("circuit breaker success path denied: {err}");
            }
            breaker.on_success();
        });
    });

    group.bench_function("fail_to_open", |b| {
        b.iter(|| {
            let config = CircuitBreakerConfig::builder()
                .failure_threshold(5)
                .half_open_after(Duration::from_secs(30))
                .build()
                .expect("valid circuit breaker config for benchmarks");

            let breaker = CircuitBreaker::new(config)
                .expect("circuit breaker should build with benchmark configuration");

            for _ in 0..5 {
                let permitted = breaker.permit();
                let _permitted = black_box(permitted);
                breaker.on_failure();
            }

            black_box(breaker.state());
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .half_open_after(Duration::from_secs(60))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker =
            CircuitBreaker::new(config).expect("circuit breaker should build for short-circuit");

        // Trip the breaker so it remains open for the benchmark iterations.
        breaker.on_failure();

        b.iter(|| {
            let denied = breaker.permit();
            let _denied = black_box(denied);
        });
    });

    group.finish();
}

fn bench_circuit_breaker_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_state_machine");

    group.bench_function("open_half_open_recover", |b| {
        b.iter(|| {
            let clock = MockClock::new();
            let breaker = CircuitBreaker::builder()
                .failure_threshold(3)
                .half_open_after(Duration::from_millis(10))
                .clock(clock.clone())
                .build()
                .expect("circuit breaker should build with mock clock");

            for _ in 0..3 {
                breaker.on_failure();
            }
            black_box(breaker.state());

            clock.advance(Duration::from_millis(10));
            let probe = breaker.permit();
            let _probe = black_box(probe);
            breaker.on_success();

            black_box(breaker.state());
        });
    });

    group.finish();
}

// ============================================================================
// Retry Executor Benchmarks
// ============================================================================

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

#[derive(Debug, Clone)]
struct BenchError(&'static str);

impl Display for BenchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for BenchError {}

fn bench_retry_executor_outcomes(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_executor_outcomes");
    let runtime = build_runtime();

    group.bench_function("immediate_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let breaker = CircuitBreaker::default();
            let config = RetryConfig::new()
                .fixed_backoff(Duration::ZERO)
                .no_jitter()
                .build()
                .expect("retry config should build for immediate success");
            let executor =
                RetryExecutor::new(config, policies::AlwaysRetry, breaker, FallbackRouter::new());

            let outcome = executor
                .execute(Request::new(()), |_req| async { Ok::<_, BenchError>(()) })
                .await;
            if outcome.is_fallback() {
                panic!("retry immediate success routed to fallback");
            }
        });
    });

    group.bench_function("transient_failures_then_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let breaker = CircuitBreaker::new(
                CircuitBreakerConfig::builder()
                    .failure_threshold(10)
                    .half_open_after(Duration::from_secs(30))
                    .build()
                    .expect("valid circuit breaker config for transient failures"),
            )
            .expect("circuit breaker should build for transient failures");
            let config = RetryConfig::new()
                .fixed_backoff(Duration::ZERO)
                .no_jitter()
                .build()
                .expect("retry config should build for transient failures");
            let executor =
                RetryExecutor::new(config, policies::AlwaysRetry, breaker, FallbackRouter::new());

            let mut remaining_failures = 3u32;
            let outcome = executor
                .execute(Request::new(()), move |_req| {
                    let fail_now = remaining_failures > 0;
                    if fail_now {
                        remaining_failures -= 1;
                    }
                    async move {
                        if fail_now {
                            Err::<(), _>(BenchError("transient failure"))
                        } else {
                            Ok::<_, BenchError>(())
                        }
                    }
                })
                .await;

            if outcome.is_fallback() {
                panic!("retry transient failure path routed to fallback");
            }
        });
    });

    group.bench_function("breaker_bounded_failure", |b| {
        b.to_async(&runtime).iter(|| async {
            let breaker = CircuitBreaker::new(
                CircuitBreakerConfig::builder()
                    .failure_threshold(4)
                    .half_open_after(Duration::from_secs(30))
                    .build()
                    .expect("valid circuit breaker config for failure case"),
            )
            .expect("circuit breaker should build for failure case");
            let config = RetryConfig::new()
                .fixed_backoff(Duration::ZERO)
                .no_jitter()
                .build()
                .expect("retry config should build for failure case");
            let executor =
                RetryExecutor::new(config, policies::AlwaysRetry, breaker, FallbackRouter::new());

            let outcome = executor
                .execute(Request::new(()), |_req| async {
                    Err::<(), _>(BenchError("permanent failure"))
                })
                .await;
            let _outcome = black_box(outcome);
        });
    });

    group.finish();
}

// ============================================================================
// Backoff and Jitter Benchmarks
// ============================================================================

fn bench_retry_backoff_calculations(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff_calculations");
    let attempts = [1u32, 2, 5, 10];

    let policies = [
        ("fixed", BackoffPolicy::Fixed(Duration::from_millis(1))),
        (
            "linear",
            BackoffPolicy::Linear {
                initial_delay: Duration::from_millis(1),
                increment: Duration::from_millis(5),
            },
        ),
        (
            "exponential",
            BackoffPolicy::Exponential {
                initial_delay: Duration::from_millis(1),
                base: 2.0,
                max_delay: Duration::from_secs(1),
            },
        ),
    ];

    for (name, policy) in policies {
        group.bench_with_input(BenchmarkId::new("delay_for", name), &policy, |b, policy| {
            b.iter(|| {
                for attempt in attempts {
                    black_box(policy.delay_for(attempt));
                }
            });
        });
    }

    group.finish();
}

fn bench_retry_jitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_jitter");
    let delays = [Duration::from_millis(1), Duration::from_millis(5), Duration::from_millis(10)];

    let jitters = [("none", Jitter::None), ("full", Jitter::Full), ("equal", Jitter::Equal)];

    for (name, jitter) in jitters {
        group.bench_with_input(BenchmarkId::new("apply", name), &jitter, |b, jitter| {
            b.iter(|| {
                for delay in delays {
                    black_box(jitter.apply(delay));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    resilience,
    bench_circuit_breaker_admission_paths,
    bench_circuit_breaker_state_machine,
    bench_retry_executor_outcomes,
    bench_retry_backoff_calculations,
    bench_retry_jitter
);
criterion_main!(resilience);
