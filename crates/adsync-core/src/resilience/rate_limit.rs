//! Rate limiter
//!
//! One governor limiter per (platform, endpoint), burst sized by the
//! configured capacity and replenished at the configured rate.
//!
//! Limiters are created lazily on first use. Admission is a single atomic
//! GCRA step inside governor, so two concurrent callers can never both spend
//! the last cell. `admit` never sleeps; `acquire` is the waiting variant used
//! by the orchestrator.
//!
//! Limiters read tokio's clock so paused-time tests and the runtime agree on
//! when budget refills.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::StateInformationMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{InsufficientCapacity, Quota};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{RateLimitConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::model::{Endpoint, Platform};

type GovernorRateLimiter =
    governor::RateLimiter<NotKeyed, InMemoryState, TokioClock, StateInformationMiddleware>;

/// Governor clock backed by `tokio::time::Instant`
#[derive(Debug, Clone, Copy)]
struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(Instant::now().saturating_duration_since(self.origin))
    }
}

/// Result of an admission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Tokens were deducted; the call may proceed
    Granted,
    /// Not enough tokens; the minimum time until the request would succeed
    MustWait(Duration),
}

/// Point-in-time view of one budget
#[derive(Debug, Clone, PartialEq)]
pub struct RateBudget {
    pub platform: Platform,
    pub endpoint: Endpoint,
    pub capacity: u32,
    pub refill_per_sec: f64,
    /// Tokens available now: what the last grant left plus refill since
    pub tokens: f64,
    /// When the last request was granted
    pub last_grant: Option<Instant>,
}

struct Bucket {
    limit: RateLimitConfig,
    limiter: GovernorRateLimiter,
    // remaining burst after the last grant, and when it was granted
    last_grant: Mutex<Option<(u32, Instant)>>,
}

impl Bucket {
    fn new(
        limit: RateLimitConfig,
        clock: &TokioClock,
        platform: Platform,
        endpoint: Endpoint,
    ) -> Result<Self> {
        let invalid = || {
            Error::config(format!(
                "{}/{} rate limit needs a positive capacity and refill rate",
                platform, endpoint
            ))
        };
        let burst = NonZeroU32::new(limit.capacity).ok_or_else(invalid)?;
        if !(limit.refill_per_sec.is_finite() && limit.refill_per_sec > 0.0) {
            return Err(invalid());
        }
        let quota = Quota::with_period(Duration::from_secs_f64(1.0 / limit.refill_per_sec))
            .ok_or_else(invalid)?
            .allow_burst(burst);

        Ok(Self {
            limit,
            limiter: governor::RateLimiter::direct_with_clock(quota, clock)
                .with_middleware::<StateInformationMiddleware>(),
            last_grant: Mutex::new(None),
        })
    }

    fn tokens(&self, now: Instant) -> f64 {
        let capacity = self.limit.capacity as f64;
        match *self.last_grant.lock().unwrap_or_else(|e| e.into_inner()) {
            None => capacity,
            Some((remaining, at)) => {
                let refilled =
                    now.saturating_duration_since(at).as_secs_f64() * self.limit.refill_per_sec;
                (remaining as f64 + refilled).min(capacity)
            }
        }
    }
}

/// Per-(platform, endpoint) rate budgets
pub struct RateLimiter {
    limits: HashMap<(Platform, Endpoint), RateLimitConfig>,
    clock: TokioClock,
    buckets: Mutex<HashMap<(Platform, Endpoint), Arc<Bucket>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Build a limiter with the limits resolved from configuration
    pub fn from_config(config: &SyncConfig) -> Self {
        let mut limits = HashMap::new();
        for platform in Platform::ALL {
            for endpoint in Endpoint::ALL {
                limits.insert((platform, endpoint), config.rate_limit_for(platform, endpoint));
            }
        }
        Self::new(limits)
    }

    /// Build a limiter from explicit limits
    ///
    /// Keys without an entry fall back to the built-in platform defaults.
    pub fn new(limits: HashMap<(Platform, Endpoint), RateLimitConfig>) -> Self {
        Self {
            limits,
            clock: TokioClock::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, platform: Platform, endpoint: Endpoint) -> RateLimitConfig {
        self.limits
            .get(&(platform, endpoint))
            .copied()
            .unwrap_or_else(|| RateLimitConfig::default_for(platform, endpoint))
    }

    fn bucket(&self, platform: Platform, endpoint: Endpoint) -> Result<Arc<Bucket>> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| Error::Other("rate limiter lock poisoned".to_string()))?;
        if let Some(bucket) = buckets.get(&(platform, endpoint)) {
            return Ok(bucket.clone());
        }
        let bucket = Arc::new(Bucket::new(
            self.limit_for(platform, endpoint),
            &self.clock,
            platform,
            endpoint,
        )?);
        buckets.insert((platform, endpoint), bucket.clone());
        Ok(bucket)
    }

    /// Try to take `cost` tokens without waiting
    ///
    /// # Returns
    ///
    /// - `Ok(Admission::Granted)`: tokens deducted
    /// - `Ok(Admission::MustWait(d))`: nothing deducted; retry after `d`
    /// - `Err(Error::Validation)`: `cost` can never fit in the budget
    pub fn admit(&self, platform: Platform, endpoint: Endpoint, cost: u32) -> Result<Admission> {
        let bucket = self.bucket(platform, endpoint)?;
        let Some(cells) = NonZeroU32::new(cost) else {
            return Ok(Admission::Granted);
        };

        match bucket.limiter.check_n(cells) {
            Ok(Ok(snapshot)) => {
                *bucket.last_grant.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some((snapshot.remaining_burst_capacity(), Instant::now()));
                Ok(Admission::Granted)
            }
            Ok(Err(not_until)) => Ok(Admission::MustWait(
                not_until.wait_time_from(self.clock.now()),
            )),
            Err(InsufficientCapacity(capacity)) => Err(Error::validation(format!(
                "request cost {} exceeds {}/{} bucket capacity {}",
                cost, platform, endpoint, capacity
            ))),
        }
    }

    /// Take `cost` tokens, sleeping while the advised wait stays within `max_wait`
    ///
    /// A wait longer than `max_wait` is reported as a local `RateLimited` error
    /// carrying the advised wait as its retry-after hint, so the retry handler
    /// can schedule the next attempt precisely.
    pub async fn acquire(
        &self,
        platform: Platform,
        endpoint: Endpoint,
        cost: u32,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            match self.admit(platform, endpoint, cost)? {
                Admission::Granted => return Ok(()),
                Admission::MustWait(wait) if wait > max_wait => {
                    return Err(Error::rate_limited(
                        format!("local {}/{} budget exhausted", platform, endpoint),
                        Some(wait),
                    ));
                }
                Admission::MustWait(wait) => {
                    debug!(%platform, %endpoint, wait_ms = wait.as_millis() as u64, "Waiting for rate budget");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(Error::cancelled("cancelled while waiting for rate budget"));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Current state of a budget, if it has been used
    pub fn snapshot(&self, platform: Platform, endpoint: Endpoint) -> Option<RateBudget> {
        let bucket = self.buckets.lock().ok()?.get(&(platform, endpoint))?.clone();
        let last_grant = bucket
            .last_grant
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|(_, at)| at);
        Some(RateBudget {
            platform,
            endpoint,
            capacity: bucket.limit.capacity,
            refill_per_sec: bucket.limit.refill_per_sec,
            tokens: bucket.tokens(Instant::now()),
            last_grant,
        })
    }
}
