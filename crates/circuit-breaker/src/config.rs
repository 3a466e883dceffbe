use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Name used in logs, metrics and rejection errors.
    pub name: String,

    /// Number of most recent call outcomes kept in the sliding window.
    pub sliding_window_size: usize,

    /// Outcomes required in the window before the failure rate is evaluated.
    pub minimum_calls: usize,

    /// Failure percentage (0-100) at or above which the breaker opens.
    pub failure_rate_threshold: f64,

    /// Time spent in Open before trial calls are allowed.
    pub wait_duration_in_open_state: Duration,

    /// Trial calls allowed in HalfOpen.
    pub permitted_calls_in_half_open_state: usize,
}

impl CircuitBreakerConfig {
    /// Creates the default configuration under a different name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            sliding_window_size: 10,
            minimum_calls: 10,
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state: Duration::from_secs(10),
            permitted_calls_in_half_open_state: 3,
        }
    }
}
