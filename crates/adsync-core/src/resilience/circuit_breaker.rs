//! Circuit breaker per (platform, endpoint).
//!
//! Stops hammering a platform endpoint that keeps failing and lets a single
//! trial call through once the cool-down has passed.
//!
//! ```text
//!            threshold failures              cool-down elapsed
//!   Closed ─────────────────────► Open ───────────────────────► HalfOpen
//!     ▲                            ▲                               │
//!     │          trial succeeds    │       trial fails             │
//!     └────────────────────────────┼───────────────────────────────┤
//!                                  └───────────────────────────────┘
//! ```
//!
//! Only Network, Timeout, Platform and Unknown outcomes count as failures.
//! A Validation, Authentication or RateLimited outcome proves the endpoint
//! is reachable and counts as success.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CircuitBreakerConfig, SyncConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::model::{Endpoint, Platform};

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,

    /// Calls are rejected without reaching the platform.
    Open,

    /// One trial call is testing whether the endpoint recovered.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub platform: Platform,
    pub endpoint: Endpoint,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    /// Monotonic start of the current cool-down.
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl Circuit {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            opened_at_wall: None,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.opened_at_wall = Some(Utc::now());
        self.trial_in_flight = false;
    }
}

/// How a guarded operation ended, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    Failure,
    Cancelled,
}

impl Verdict {
    fn of(error: Option<&Error>) -> Self {
        match error.map(Error::kind) {
            None => Verdict::Success,
            Some(ErrorKind::Cancelled) => Verdict::Cancelled,
            Some(kind) if kind.trips_circuit() => Verdict::Failure,
            Some(_) => Verdict::Success,
        }
    }
}

/// Per-(platform, endpoint) circuit breakers.
///
/// Circuits are created lazily, closed. All transitions happen under one
/// mutex, so checking and transitioning is atomic.
#[derive(Debug)]
pub struct CircuitBreaker {
    configs: HashMap<Platform, CircuitBreakerConfig>,
    circuits: Mutex<HashMap<(Platform, Endpoint), Circuit>>,
}

impl CircuitBreaker {
    /// Build breakers with the per-platform policies resolved from configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        let configs = Platform::ALL
            .into_iter()
            .map(|p| (p, config.circuit_breaker_for(p)))
            .collect();
        Self::new(configs)
    }

    /// Build breakers from explicit policies; missing platforms use the defaults.
    pub fn new(configs: HashMap<Platform, CircuitBreakerConfig>) -> Self {
        Self {
            configs,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    fn config_for(&self, platform: Platform) -> CircuitBreakerConfig {
        self.configs.get(&platform).cloned().unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(Platform, Endpoint), Circuit>>> {
        self.circuits
            .lock()
            .map_err(|_| Error::Other("circuit breaker lock poisoned".to_string()))
    }

    /// Ask permission to call the platform.
    ///
    /// # Returns
    ///
    /// - `Ok(permit)`: proceed, then hand the outcome to [`CircuitPermit::complete`]
    /// - `Err(Error::CircuitOpen)`: the circuit is open, or a half-open trial
    ///   is already running
    pub fn acquire(&self, platform: Platform, endpoint: Endpoint) -> Result<CircuitPermit<'_>> {
        let cooldown = self.config_for(platform).cooldown();
        let now = Instant::now();
        let mut circuits = self.lock()?;
        let circuit = circuits
            .entry((platform, endpoint))
            .or_insert_with(Circuit::closed);

        let trial = match circuit.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = circuit
                    .opened_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= cooldown);
                if !cooled {
                    return Err(Error::circuit_open(platform.as_str(), endpoint.as_str()));
                }
                info!(%platform, %endpoint, "Circuit half-open, allowing one trial call");
                circuit.state = CircuitState::HalfOpen;
                circuit.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if circuit.trial_in_flight {
                    return Err(Error::circuit_open(platform.as_str(), endpoint.as_str()));
                }
                circuit.trial_in_flight = true;
                true
            }
        };

        Ok(CircuitPermit {
            breaker: self,
            platform,
            endpoint,
            trial,
            settled: false,
        })
    }

    fn settle(&self, platform: Platform, endpoint: Endpoint, trial: bool, verdict: Verdict) {
        let threshold = self.config_for(platform).failure_threshold;
        let Ok(mut circuits) = self.lock() else {
            return;
        };
        let circuit = circuits
            .entry((platform, endpoint))
            .or_insert_with(Circuit::closed);

        if verdict == Verdict::Failure {
            circuit.last_failure_at = Some(Utc::now());
        }

        // Outcomes of calls admitted before the circuit opened do not move an
        // open or half-open circuit; only the trial does.
        match (circuit.state, trial, verdict) {
            (CircuitState::HalfOpen, true, Verdict::Success) => {
                info!(%platform, %endpoint, "Trial succeeded, circuit closed");
                *circuit = Circuit {
                    last_failure_at: circuit.last_failure_at,
                    ..Circuit::closed()
                };
            }
            (CircuitState::HalfOpen, true, Verdict::Failure) => {
                warn!(%platform, %endpoint, "Trial failed, circuit re-opened");
                circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
                circuit.open(Instant::now());
            }
            (CircuitState::HalfOpen, true, Verdict::Cancelled) => {
                // back to open; the original cool-down stays in force
                debug!(%platform, %endpoint, "Trial cancelled, circuit open");
                circuit.state = CircuitState::Open;
                circuit.trial_in_flight = false;
            }
            (CircuitState::Closed, _, Verdict::Success) => {
                circuit.consecutive_failures = 0;
            }
            (CircuitState::Closed, _, Verdict::Failure) => {
                circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
                if circuit.consecutive_failures >= threshold {
                    warn!(
                        %platform,
                        %endpoint,
                        failures = circuit.consecutive_failures,
                        "Circuit opened after consecutive failures"
                    );
                    circuit.open(Instant::now());
                }
            }
            _ => {}
        }
    }

    /// Current state of a circuit (closed if never used).
    pub fn snapshot(&self, platform: Platform, endpoint: Endpoint) -> CircuitSnapshot {
        let mut snapshot = CircuitSnapshot {
            platform,
            endpoint,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
        };
        if let Ok(circuits) = self.lock()
            && let Some(circuit) = circuits.get(&(platform, endpoint))
        {
            snapshot.state = circuit.state;
            snapshot.consecutive_failures = circuit.consecutive_failures;
            snapshot.last_failure_at = circuit.last_failure_at;
            snapshot.opened_at = circuit.opened_at_wall;
        }
        snapshot
    }

    /// Force a circuit back to closed.
    pub fn reset(&self, platform: Platform, endpoint: Endpoint) {
        if let Ok(mut circuits) = self.lock() {
            info!(%platform, %endpoint, "Circuit reset");
            circuits.remove(&(platform, endpoint));
        }
    }
}

/// Permission to make one guarded call.
///
/// Dropping a permit without completing it counts as a cancellation, so an
/// abandoned half-open trial never wedges the circuit.
#[must_use = "a permit must be completed with the call outcome"]
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    platform: Platform,
    endpoint: Endpoint,
    trial: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Report the outcome of the guarded call (`None` for success).
    pub fn complete(mut self, error: Option<&Error>) {
        self.settled = true;
        self.breaker
            .settle(self.platform, self.endpoint, self.trial, Verdict::of(error));
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker
                .settle(self.platform, self.endpoint, self.trial, Verdict::Cancelled);
        }
    }
}
