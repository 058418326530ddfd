//! Resilience layer wrapped around every native platform call
//!
//! ```text
//! circuit breaker ──► retry handler ──► rate limiter ──► connector call
//!  (per platform/      (per call,        (per platform/
//!   endpoint)           bounded)          endpoint)
//! ```
//!
//! The breaker sees one outcome per fully retried operation. The limiter is
//! consulted before every attempt, so retries spend tokens too.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitPermit, CircuitSnapshot, CircuitState};
pub use rate_limit::{Admission, RateBudget, RateLimiter};
pub use retry::{Attempted, RetryHandler, RetryPolicy};
