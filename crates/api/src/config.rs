//! Server configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use circuit_breaker::CircuitBreakerConfig;
use delivery::DeliveryConfig;
use event_bus::{BusConfig, RetryPolicy};
use order::OrderConfig;
use payment::GatewayConfig;
use saga::SagaConfig;
use saga::choreography::RESTAURANT_BREAKER;

/// Output format of the fmt tracing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Application configuration.
///
/// Every field has an environment variable; unset or unparsable variables
/// fall back to the default.
///
/// | Variable | Default |
/// |----------|---------|
/// | `HOST` / `PORT` | `0.0.0.0` / `3000` |
/// | `RUST_LOG` | `info` |
/// | `LOG_FORMAT` | `text` |
/// | `DATABASE_URL` | unset (in-memory event log) |
/// | `BUS_CONCURRENCY` | `3` |
/// | `BUS_MAX_ATTEMPTS` | `3` |
/// | `BUS_RETRY_BACKOFF_MS` | `200` |
/// | `BUS_DEAD_LETTER_CAPACITY` | `1000` |
/// | `CB_WINDOW_SIZE` | `10` |
/// | `CB_FAILURE_RATE` | `50` |
/// | `CB_WAIT_SECS` | `10` |
/// | `CB_HALF_OPEN_CALLS` | `3` |
/// | `PAYMENT_SUCCESS_RATE` | `0.95` |
/// | `PAYMENT_MIN_LATENCY_MS` / `PAYMENT_MAX_LATENCY_MS` | `2000` / `3000` |
/// | `DELIVERY_ETA_MINUTES` | `30` |
/// | `DELIVERY_REASSIGN_ON_FAILURE` | `false` |
/// | `SEED_PARTNERS` | `5` |
/// | `SEED_RESTAURANTS` | `10` |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub bus_concurrency: usize,
    pub bus_max_attempts: u32,
    pub bus_retry_backoff_ms: u64,
    pub bus_dead_letter_capacity: usize,
    pub cb_window_size: usize,
    pub cb_failure_rate: f64,
    pub cb_wait_secs: u64,
    pub cb_half_open_calls: usize,
    pub payment_success_rate: f64,
    pub payment_min_latency_ms: u64,
    pub payment_max_latency_ms: u64,
    pub delivery_eta_minutes: u64,
    pub delivery_reassign_on_failure: bool,
    pub seed_partners: i64,
    pub seed_restaurants: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse::<u16>(var("PORT")).unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse::<LogFormat>(var("LOG_FORMAT")).unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL"),
            bus_concurrency: parse::<usize>(var("BUS_CONCURRENCY"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.bus_concurrency),
            bus_max_attempts: parse::<u32>(var("BUS_MAX_ATTEMPTS"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.bus_max_attempts),
            bus_retry_backoff_ms: parse::<u64>(var("BUS_RETRY_BACKOFF_MS"))
                .unwrap_or(defaults.bus_retry_backoff_ms),
            bus_dead_letter_capacity: parse::<usize>(var("BUS_DEAD_LETTER_CAPACITY"))
                .unwrap_or(defaults.bus_dead_letter_capacity),
            cb_window_size: parse::<usize>(var("CB_WINDOW_SIZE"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.cb_window_size),
            cb_failure_rate: parse::<f64>(var("CB_FAILURE_RATE"))
                .filter(|r| (0.0..=100.0).contains(r))
                .unwrap_or(defaults.cb_failure_rate),
            cb_wait_secs: parse::<u64>(var("CB_WAIT_SECS")).unwrap_or(defaults.cb_wait_secs),
            cb_half_open_calls: parse::<usize>(var("CB_HALF_OPEN_CALLS"))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.cb_half_open_calls),
            payment_success_rate: parse::<f64>(var("PAYMENT_SUCCESS_RATE"))
                .filter(|r| (0.0..=1.0).contains(r))
                .unwrap_or(defaults.payment_success_rate),
            payment_min_latency_ms: parse::<u64>(var("PAYMENT_MIN_LATENCY_MS"))
                .unwrap_or(defaults.payment_min_latency_ms),
            payment_max_latency_ms: parse::<u64>(var("PAYMENT_MAX_LATENCY_MS"))
                .unwrap_or(defaults.payment_max_latency_ms),
            delivery_eta_minutes: parse::<u64>(var("DELIVERY_ETA_MINUTES"))
                .unwrap_or(defaults.delivery_eta_minutes),
            delivery_reassign_on_failure: parse::<bool>(var("DELIVERY_REASSIGN_ON_FAILURE"))
                .unwrap_or(defaults.delivery_reassign_on_failure),
            seed_partners: parse::<i64>(var("SEED_PARTNERS"))
                .filter(|n| *n >= 0)
                .unwrap_or(defaults.seed_partners),
            seed_restaurants: parse::<i64>(var("SEED_RESTAURANTS"))
                .filter(|n| *n >= 0)
                .unwrap_or(defaults.seed_restaurants),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bus(&self) -> BusConfig {
        BusConfig {
            concurrency: self.bus_concurrency,
            retry: RetryPolicy {
                max_attempts: self.bus_max_attempts,
                initial_backoff: Duration::from_millis(self.bus_retry_backoff_ms),
                ..RetryPolicy::default()
            },
            dead_letter_capacity: self.bus_dead_letter_capacity,
        }
    }

    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            sliding_window_size: self.cb_window_size,
            minimum_calls: self.cb_window_size,
            failure_rate_threshold: self.cb_failure_rate,
            wait_duration_in_open_state: Duration::from_secs(self.cb_wait_secs),
            permitted_calls_in_half_open_state: self.cb_half_open_calls,
            ..CircuitBreakerConfig::named(RESTAURANT_BREAKER)
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            success_rate: self.payment_success_rate,
            min_latency: Duration::from_millis(self.payment_min_latency_ms),
            max_latency: Duration::from_millis(self.payment_max_latency_ms),
        }
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            estimated_delivery: Duration::from_secs(self.delivery_eta_minutes * 60),
            reassign_on_failure: self.delivery_reassign_on_failure,
        }
    }

    pub fn saga(&self) -> SagaConfig {
        SagaConfig {
            order: OrderConfig::default(),
            delivery: self.delivery(),
            breaker: self.breaker(),
        }
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            bus_concurrency: 3,
            bus_max_attempts: 3,
            bus_retry_backoff_ms: 200,
            bus_dead_letter_capacity: 1000,
            cb_window_size: 10,
            cb_failure_rate: 50.0,
            cb_wait_secs: 10,
            cb_half_open_calls: 3,
            payment_success_rate: 0.95,
            payment_min_latency_ms: 2000,
            payment_max_latency_ms: 3000,
            delivery_eta_minutes: 30,
            delivery_reassign_on_failure: false,
            seed_partners: 5,
            seed_restaurants: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.seed_partners, 5);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/saga"),
            ("CB_WINDOW_SIZE", "20"),
            ("DELIVERY_REASSIGN_ON_FAILURE", "true"),
            ("PAYMENT_MIN_LATENCY_MS", "0"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/saga")
        );
        assert_eq!(config.breaker().sliding_window_size, 20);
        assert_eq!(config.breaker().minimum_calls, 20);
        assert!(config.delivery().reassign_on_failure);
        assert_eq!(config.gateway().min_latency, Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("PAYMENT_SUCCESS_RATE", "1.5"),
            ("BUS_CONCURRENCY", "0"),
            ("DATABASE_URL", ""),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.payment_success_rate, 0.95);
        assert_eq!(config.bus_concurrency, 3);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_derived_configs() {
        let config = Config::default();

        assert_eq!(config.bus().retry.max_attempts, 3);
        assert_eq!(config.bus().retry.initial_backoff, Duration::from_millis(200));
        assert_eq!(config.bus().dead_letter_capacity, 1000);
        assert_eq!(config.breaker().name, RESTAURANT_BREAKER);
        assert_eq!(
            config.delivery().estimated_delivery,
            Duration::from_secs(1800)
        );
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}
