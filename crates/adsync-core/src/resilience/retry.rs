//! Retry handler
//!
//! Bounded retry around a single native call, driven by a backon
//! exponential schedule.
//!
//! - Only retryable kinds are retried (see `ErrorKind::is_retryable`).
//! - A platform retry-after hint replaces the scheduled delay exactly.
//! - Unknown failures get one more try at most.
//! - Every attempt has a deadline; running past it is a retryable timeout.
//! - Non-idempotent calls are retried only when the platform refused them
//!   outright, since any other failure may hide an applied request.
//! - Authentication failures may trigger one re-authentication and one extra
//!   attempt that does not count against the budget.
//! - Waiting between attempts stops as soon as the cancellation token fires.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{Error, ErrorKind, Result};

/// Retry parameters in resolved form
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
    pub call_timeout: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter_ratio: config.jitter_ratio,
            call_timeout: config.call_timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Doubling schedule for a run of at most `attempts` calls
    ///
    /// backon's own jitter may add up to the full delay, so it stays off
    /// here and [`jittered`](Self::jittered) applies the configured ratio.
    pub fn backoff(&self, attempts: u32) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(attempts.saturating_sub(1) as usize)
    }

    /// `delay` plus up to `jitter_ratio` of itself
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        delay + delay.mul_f64(jitter)
    }
}

/// Final outcome of a retried operation with the number of calls it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    fn done(result: Result<T>, attempts: u32) -> Self {
        Self { result, attempts }
    }
}

/// Executes one operation under a retry policy
#[derive(Debug, Clone)]
pub struct RetryHandler {
    policy: RetryPolicy,
    cancel: CancellationToken,
    idempotent: bool,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            policy,
            cancel,
            idempotent: true,
        }
    }

    /// Retry only failures the platform reported before applying the call
    ///
    /// A timeout, a dropped connection or a 5xx leaves it unknown whether a
    /// create went through; retrying those could deploy a second campaign.
    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    /// Run `operation` until it succeeds, fails permanently or the budget runs out
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, None::<fn() -> std::future::Ready<Result<()>>>)
            .await
    }

    /// Like [`execute`](Self::execute), re-authenticating once on an
    /// Authentication failure
    ///
    /// `reauth` runs at most once. The attempt after it is free; a second
    /// Authentication failure is returned as is.
    pub async fn execute_with_reauth<T, F, Fut, R, RFut>(
        &self,
        operation: F,
        reauth: R,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut() -> RFut,
        RFut: Future<Output = Result<()>>,
    {
        self.run(operation, Some(reauth)).await
    }

    async fn run<T, F, Fut, R, RFut>(&self, mut operation: F, reauth: Option<R>) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut() -> RFut,
        RFut: Future<Output = Result<()>>,
    {
        let calls = AtomicU32::new(0);
        let unknown_retried = AtomicBool::new(false);

        let first = self
            .attempt_all(&mut operation, self.policy.max_attempts, &calls, &unknown_retried)
            .await;
        let error = match first {
            Ok(value) => return Attempted::done(Ok(value), calls.load(Ordering::SeqCst)),
            Err(e) => e,
        };

        let Some(mut reauth) = reauth.filter(|_| error.kind() == ErrorKind::Authentication) else {
            return Attempted::done(Err(error), calls.load(Ordering::SeqCst));
        };

        let used = calls.load(Ordering::SeqCst);
        debug!(attempt = used, "Authentication rejected, re-authenticating once");
        if let Err(e) = reauth().await {
            return Attempted::done(Err(e), used);
        }

        // the attempt after re-authentication is free
        let remaining = self.policy.max_attempts.saturating_sub(used) + 1;
        let second = self
            .attempt_all(&mut operation, remaining, &calls, &unknown_retried)
            .await;
        Attempted::done(second, calls.load(Ordering::SeqCst))
    }

    /// One backon run of at most `attempts` calls
    async fn attempt_all<T, F, Fut>(
        &self,
        operation: &mut F,
        attempts: u32,
        calls: &AtomicU32,
        unknown_retried: &AtomicBool,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let call_timeout = self.policy.call_timeout;
        let attempt = || {
            let call = (!self.cancel.is_cancelled()).then(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                operation()
            });
            let cancel = self.cancel.clone();
            async move {
                let Some(call) = call else {
                    return Err(Error::cancelled("operation cancelled"));
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::cancelled("operation cancelled")),
                    result = tokio::time::timeout(call_timeout, call) => {
                        result.unwrap_or(Err(Error::Timeout(call_timeout)))
                    }
                }
            }
        };

        let sleep_cancel = self.cancel.clone();
        let result = attempt
            .retry(self.policy.backoff(attempts))
            .sleep(move |delay: Duration| {
                let cancel = sleep_cancel.clone();
                async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            })
            .when(|error: &Error| self.should_retry(error.kind(), unknown_retried))
            .adjust(|error: &Error, next: Option<Duration>| {
                next.map(|delay| {
                    error
                        .retry_after()
                        .unwrap_or_else(|| self.policy.jittered(delay))
                })
            })
            .notify(|error: &Error, delay: Duration| {
                warn!(
                    attempt = calls.load(Ordering::SeqCst),
                    kind = %error.kind(),
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying: {}", error
                );
            })
            .await;

        if let Err(error) = &result
            && error.is_retryable()
            && calls.load(Ordering::SeqCst) > 1
        {
            warn!(attempts = calls.load(Ordering::SeqCst), error = %error, "Retry budget exhausted");
        }
        result
    }

    fn should_retry(&self, kind: ErrorKind, unknown_retried: &AtomicBool) -> bool {
        if !kind.is_retryable() {
            return false;
        }
        if !self.idempotent && kind != ErrorKind::RateLimited {
            return false;
        }
        kind != ErrorKind::Unknown || !unknown_retried.swap(true, Ordering::SeqCst)
    }
}
