use std::collections::VecDeque;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{CircuitBreakerConfig, CircuitState};

/// Returned to the fallback when the breaker refuses to attempt a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit breaker '{name}' is {state} and does not permit further calls")]
pub struct CircuitOpenError {
    pub name: String,
    pub state: CircuitState,
}

/// Why the fallback was invoked.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker short-circuited the call; the dependency was not invoked.
    #[error(transparent)]
    Rejected(CircuitOpenError),

    /// The dependency was invoked and failed.
    #[error("call failed: {0}")]
    Failed(E),
}

impl<E> CallError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CallError::Rejected(_))
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    /// Failure percentage over the window; None until `minimum_calls` outcomes exist.
    pub failure_rate: Option<f64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Most recent outcomes, `true` for a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    trial_permits_issued: usize,
    trial_successes: usize,
    /// Bumped on every state change; tags the permits issued in a state.
    generation: u64,
}

/// Admission to run one protected call.
#[derive(Debug, Clone, Copy)]
struct Permit {
    state: CircuitState,
    generation: u64,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::with_capacity(capacity),
            opened_at: None,
            trial_permits_issued: 0,
            trial_successes: 0,
            generation: 0,
        }
    }

    fn failed_calls(&self) -> usize {
        self.window.iter().filter(|failed| **failed).count()
    }

    fn failure_rate(&self, config: &CircuitBreakerConfig) -> Option<f64> {
        if self.window.is_empty() || self.window.len() < config.minimum_calls {
            return None;
        }
        Some(self.failed_calls() as f64 * 100.0 / self.window.len() as f64)
    }

    fn record(&mut self, failed: bool, config: &CircuitBreakerConfig) {
        if self.window.len() == config.sliding_window_size.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(failed);
    }
}

/// Sliding-window circuit breaker.
///
/// State and window are shared by every caller and updated under a single
/// lock; the protected call itself runs outside the lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let inner = Inner::new(config.sliding_window_size);
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `operation` if the breaker permits it.
    ///
    /// Returns the operation's value on success. Otherwise returns whatever
    /// `fallback` produces from the rejection or failure.
    pub async fn call<T, E, Op, Fut, Fb>(&self, operation: Op, fallback: Fb) -> T
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        Fb: FnOnce(CallError<E>) -> T,
    {
        match self.try_call(operation).await {
            Ok(value) => value,
            Err(err) => fallback(err),
        }
    }

    /// Runs `operation` if the breaker permits it and reports why it did not
    /// produce a value.
    pub async fn try_call<T, E, Op, Fut>(&self, operation: Op) -> Result<T, CallError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let permit = match self.acquire_permission().await {
            Ok(permit) => permit,
            Err(rejected) => {
                metrics::counter!(
                    "circuit_breaker_calls_total",
                    "name" => self.config.name.clone(),
                    "outcome" => "rejected"
                )
                .increment(1);
                tracing::debug!(breaker = %self.config.name, state = %rejected.state, "call short-circuited");
                return Err(CallError::Rejected(rejected));
            }
        };

        match operation().await {
            Ok(value) => {
                self.on_outcome(permit, false).await;
                metrics::counter!(
                    "circuit_breaker_calls_total",
                    "name" => self.config.name.clone(),
                    "outcome" => "success"
                )
                .increment(1);
                Ok(value)
            }
            Err(err) => {
                self.on_outcome(permit, true).await;
                metrics::counter!(
                    "circuit_breaker_calls_total",
                    "name" => self.config.name.clone(),
                    "outcome" => "failure"
                )
                .increment(1);
                tracing::warn!(breaker = %self.config.name, error = %err, "protected call failed");
                Err(CallError::Failed(err))
            }
        }
    }

    /// Current state, applying the Open→HalfOpen timeout if it has elapsed.
    pub async fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().await;
        self.expire_open(&mut inner);
        inner.state
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock().await;
        self.expire_open(&mut inner);
        BreakerSnapshot {
            name: self.config.name.clone(),
            state: inner.state,
            buffered_calls: inner.window.len(),
            failed_calls: inner.failed_calls(),
            failure_rate: inner.failure_rate(&self.config),
        }
    }

    async fn acquire_permission(&self) -> Result<Permit, CircuitOpenError> {
        let mut inner = self.inner.lock().await;
        self.expire_open(&mut inner);

        let permit = Permit {
            state: inner.state,
            generation: inner.generation,
        };
        match inner.state {
            CircuitState::Closed => Ok(permit),
            CircuitState::HalfOpen
                if inner.trial_permits_issued < self.config.permitted_calls_in_half_open_state =>
            {
                inner.trial_permits_issued += 1;
                Ok(permit)
            }
            state => Err(CircuitOpenError {
                name: self.config.name.clone(),
                state,
            }),
        }
    }

    /// Records a finished call.
    ///
    /// Only a call admitted in the current state can move the breaker. A
    /// call that outlived the state it was admitted in is recorded in the
    /// window and nothing else, so a HalfOpen verdict rests on trial calls
    /// alone.
    async fn on_outcome(&self, permit: Permit, failed: bool) {
        let mut inner = self.inner.lock().await;
        inner.record(failed, &self.config);

        if permit.generation != inner.generation {
            tracing::debug!(breaker = %self.config.name, admitted_in = %permit.state, state = %inner.state, "outcome of a call from an earlier state");
            return;
        }
        match inner.state {
            CircuitState::HalfOpen if failed => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.permitted_calls_in_half_open_state {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed if failed => {
                if inner
                    .failure_rate(&self.config)
                    .is_some_and(|rate| rate >= self.config.failure_rate_threshold)
                {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    fn expire_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.wait_duration_in_open_state)
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trial_permits_issued = 0;
        inner.trial_successes = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
            }
            CircuitState::HalfOpen => {}
        }

        if from != to {
            metrics::counter!(
                "circuit_breaker_transitions_total",
                "name" => self.config.name.clone(),
                "to" => to.as_str()
            )
            .increment(1);
            tracing::info!(breaker = %self.config.name, %from, %to, "circuit breaker state changed");
        }
    }
}
