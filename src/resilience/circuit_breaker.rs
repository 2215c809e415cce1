//! Three-state circuit breaker.
//!
//! Closed forwards calls and counts consecutive failures. Reaching the
//! threshold opens the breaker; open rejects without invoking until the
//! cooldown has elapsed, after which the next call becomes the single
//! half-open trial. A successful trial closes the breaker, a failed one
//! re-opens it.
//!
//! State lives behind one mutex so a breaker can be shared across tasks.
//! The lock is never held while the wrapped operation runs.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::telemetry;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without invoking the operation.
    Open,
    /// One trial call decides whether to close or re-open.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Failure of a call made through the breaker.
///
/// `CircuitOpen` means the operation was never invoked; `Operation` carries
/// the operation's own error after it ran.
#[derive(Debug, PartialEq, Eq)]
pub enum CallError<E> {
    CircuitOpen,
    Operation(E),
}

impl<E> CallError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "Circuit open: call rejected without invocation"),
            Self::Operation(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CallError<E> {}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub timeout_secs: f64,
    pub last_failure: Option<DateTime<Utc>>,
    pub times_opened: u64,
    pub rejected_calls: u64,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    trial_in_flight: bool,
    times_opened: u64,
}

enum Admission {
    Forward,
    Trial,
    Reject,
}

/// Failure-count + cooldown tracker. Knows nothing about what it wraps.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    rejected: AtomicU64,
}

impl CircuitBreaker {
    /// Create a closed breaker. A zero threshold is raised to 1.
    pub fn new(name: impl Into<String>, mut config: CircuitBreakerConfig) -> Self {
        config.failure_threshold = config.failure_threshold.max(1);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_wall: None,
                trial_in_flight: false,
                times_opened: 0,
            }),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Does not perform the open → half-open transition;
    /// only a call does that.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            timeout_secs: self.config.timeout.as_secs_f64(),
            last_failure: inner.last_failure_wall,
            times_opened: inner.times_opened,
            rejected_calls: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Run `op` through the breaker.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = match self.admit() {
            Admission::Reject => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(breaker = %self.name, "Call rejected while circuit open");
                return Err(CallError::CircuitOpen);
            }
            Admission::Forward => None,
            Admission::Trial => Some(TrialGuard { breaker: self }),
        };

        let result = op().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        if let Some(guard) = trial {
            std::mem::forget(guard);
        }
        result.map_err(CallError::Operation)
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Forward,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if !cooled {
                    return Admission::Reject;
                }
                info!(breaker = %self.name, "Circuit breaker half-open, attempting trial call");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                Admission::Trial
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Admission::Reject
                } else {
                    inner.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "Circuit breaker closing after successful trial");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.trial_in_flight = false;
            }
            // A call admitted while closed finished after another call opened the breaker.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker opening due to failures"
                    );
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker re-opening after failed trial");
                inner.trial_in_flight = false;
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_wall = Some(Utc::now());
        inner.times_opened += 1;
        telemetry::metrics::record_breaker_opened(&self.name);
    }

    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Frees the half-open trial slot if the calling future is dropped mid-call.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        self.breaker.abandon_trial();
    }
}
