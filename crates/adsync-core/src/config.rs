//! Configuration types for the adsync engine
//!
//! Every resilience knob (bucket sizes, retry policy, breaker threshold,
//! token safety margin) can be set per platform and, for rate limits, per
//! endpoint. Anything left out falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::model::{Endpoint, Platform};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Connector instances to build
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,

    /// Per-platform resilience settings
    #[serde(default)]
    pub platforms: BTreeMap<Platform, PlatformSettings>,

    /// Default retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Default circuit breaker policy
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Credential cache settings
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.credentials.validate()?;
        self.orchestrator.validate()?;

        for (platform, settings) in &self.platforms {
            for (endpoint, limit) in &settings.rate_limits {
                limit.validate().map_err(|e| {
                    crate::Error::config(format!("{}/{}: {}", platform, endpoint, e))
                })?;
            }
            if let Some(retry) = &settings.retry {
                retry.validate()?;
            }
            if let Some(breaker) = &settings.circuit_breaker {
                breaker.validate()?;
            }
        }

        let mut seen = HashSet::new();
        for connector in &self.connectors {
            connector.validate()?;
            if !seen.insert(connector.platform()) {
                return Err(crate::Error::config(format!(
                    "Connector for {} configured more than once",
                    connector.platform()
                )));
            }
        }

        Ok(())
    }

    /// Rate limit for a (platform, endpoint) pair
    pub fn rate_limit_for(&self, platform: Platform, endpoint: Endpoint) -> RateLimitConfig {
        self.platforms
            .get(&platform)
            .and_then(|s| s.rate_limits.get(&endpoint))
            .copied()
            .unwrap_or_else(|| RateLimitConfig::default_for(platform, endpoint))
    }

    /// Retry policy for a platform
    pub fn retry_for(&self, platform: Platform) -> RetryConfig {
        self.platforms
            .get(&platform)
            .and_then(|s| s.retry.clone())
            .unwrap_or_else(|| self.retry.clone())
    }

    /// Circuit breaker policy for a platform
    pub fn circuit_breaker_for(&self, platform: Platform) -> CircuitBreakerConfig {
        self.platforms
            .get(&platform)
            .and_then(|s| s.circuit_breaker.clone())
            .unwrap_or_else(|| self.circuit_breaker.clone())
    }
}

/// Per-platform overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Token bucket per endpoint
    #[serde(default)]
    pub rate_limits: BTreeMap<Endpoint, RateLimitConfig>,

    /// Retry policy override
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// Circuit breaker override
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

/// Token bucket parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Burst size
    pub capacity: u32,
    /// Steady refill, tokens per second
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }

    /// Built-in defaults per platform
    pub fn default_for(platform: Platform, endpoint: Endpoint) -> Self {
        match (platform, endpoint) {
            (Platform::Google, Endpoint::Campaigns) => Self::new(20, 10.0),
            (Platform::Google, Endpoint::Reporting) => Self::new(10, 5.0),
            (Platform::Facebook, Endpoint::Campaigns) => Self::new(50, 25.0),
            (Platform::Facebook, Endpoint::Reporting) => Self::new(20, 10.0),
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.capacity == 0 {
            return Err(crate::Error::config("rate limit capacity must be > 0"));
        }
        if !(self.refill_per_sec.is_finite() && self.refill_per_sec > 0.0) {
            return Err(crate::Error::config("rate limit refill_per_sec must be > 0"));
        }
        Ok(())
    }
}

/// Retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (in milliseconds), doubled per retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a computed backoff delay (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter added on top of the computed delay, as a fraction of it
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Deadline for a single native call (in milliseconds)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("retry max_attempts must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(crate::Error::config("retry jitter_ratio must be within 0..=1"));
        }
        if self.call_timeout_ms == 0 {
            return Err(crate::Error::config("retry call_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Circuit breaker policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open circuit rejects calls before a trial (in seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.failure_threshold == 0 {
            return Err(crate::Error::config(
                "circuit breaker failure_threshold must be >= 1",
            ));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Credential cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Tokens expiring within this window are refreshed early (in seconds)
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
}

impl CredentialConfig {
    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_margin_secs as i64)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.refresh_margin_secs > 86_400 {
            return Err(crate::Error::config(
                "credential refresh_margin_secs must be at most one day",
            ));
        }
        Ok(())
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Longest a call waits for a rate-limiter token before it is treated
    /// as throttled (in milliseconds)
    #[serde(default = "default_max_admission_wait_ms")]
    pub max_admission_wait_ms: u64,

    /// Capacity of the sync event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl OrchestratorConfig {
    pub fn max_admission_wait(&self) -> Duration {
        Duration::from_millis(self.max_admission_wait_ms)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_admission_wait_ms: default_max_admission_wait_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorConfig {
    /// Google Ads connector
    Google {
        /// Google Ads developer token
        developer_token: String,
        /// Customer (account) id without dashes
        customer_id: String,
        /// OAuth client id used for token refresh
        client_id: String,
        /// OAuth client secret used for token refresh
        client_secret: String,
        /// Manager account id, when operating through an MCC
        #[serde(default)]
        login_customer_id: Option<String>,
        /// API base URL override
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Facebook Marketing API connector
    Facebook {
        /// Ad account id without the `act_` prefix
        ad_account_id: String,
        /// App id used for token exchange
        app_id: String,
        /// App secret used for token exchange
        app_secret: String,
        /// Graph API version, e.g. `v19.0`
        #[serde(default)]
        api_version: Option<String>,
        /// API base URL override
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Custom connector
    Custom {
        /// Platform tag this connector serves
        platform: Platform,
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ConnectorConfig {
    /// Validate the connector configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ConnectorConfig::Google {
                developer_token,
                customer_id,
                client_id,
                client_secret,
                ..
            } => {
                if developer_token.is_empty() {
                    return Err(crate::Error::config("Google developer token cannot be empty"));
                }
                if customer_id.is_empty() || !customer_id.chars().all(|c| c.is_ascii_digit()) {
                    return Err(crate::Error::config(
                        "Google customer id must be digits only (no dashes)",
                    ));
                }
                if client_id.is_empty() || client_secret.is_empty() {
                    return Err(crate::Error::config(
                        "Google OAuth client id and secret are required",
                    ));
                }
                Ok(())
            }
            ConnectorConfig::Facebook {
                ad_account_id,
                app_id,
                app_secret,
                ..
            } => {
                if ad_account_id.is_empty() || ad_account_id.starts_with("act_") {
                    return Err(crate::Error::config(
                        "Facebook ad account id is required, without the act_ prefix",
                    ));
                }
                if app_id.is_empty() || app_secret.is_empty() {
                    return Err(crate::Error::config(
                        "Facebook app id and app secret are required",
                    ));
                }
                Ok(())
            }
            ConnectorConfig::Custom {
                factory, config, ..
            } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom connector factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom connector config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Platform served by this connector
    pub fn platform(&self) -> Platform {
        match self {
            ConnectorConfig::Google { .. } => Platform::Google,
            ConnectorConfig::Facebook { .. } => Platform::Facebook,
            ConnectorConfig::Custom { platform, .. } => *platform,
        }
    }

    /// Get the factory name
    pub fn type_name(&self) -> &str {
        match self {
            ConnectorConfig::Google { .. } => "google",
            ConnectorConfig::Facebook { .. } => "facebook",
            ConnectorConfig::Custom { factory, .. } => factory,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ratio() -> f64 {
    0.1
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_refresh_margin_secs() -> u64 {
    60
}

fn default_max_admission_wait_ms() -> u64 {
    5_000
}

fn default_event_channel_capacity() -> usize {
    1000
}
