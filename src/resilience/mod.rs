//! Resilience primitives used both as subjects under test and to protect the
//! harness's own calls.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{BreakerSnapshot, CallError, CircuitBreaker, CircuitState};
pub use retry::{Backoff, RetryExecutor, RetryOutcome, RetryPolicy};
