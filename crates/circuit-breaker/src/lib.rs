//! Circuit breaker for the synchronous calls the services make to each other.
//!
//! ```text
//!            failure rate >= threshold
//!   Closed ───────────────────────────► Open
//!     ▲                                  │ wait duration elapsed
//!     │ all trial calls succeed          ▼
//!     └──────────────────────────── HalfOpen ──► Open (any trial fails)
//! ```
//!
//! [`CircuitBreaker::call`] never returns an error: when the breaker rejects a
//! call or the call fails, the fallback produces the result and receives the
//! reason.

pub mod breaker;
pub mod config;
pub mod state;

pub use breaker::{BreakerSnapshot, CallError, CircuitBreaker, CircuitOpenError};
pub use config::CircuitBreakerConfig;
pub use state::CircuitState;
