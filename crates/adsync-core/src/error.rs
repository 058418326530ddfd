//! Error types for the adsync engine
//!
//! Every failure a platform call can produce is classified exactly once, at the
//! connector boundary, into an [`ErrorKind`]. The retry handler, the circuit
//! breaker and the orchestrator only ever look at the kind.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for adsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential invalid or expired
    Authentication,
    /// The platform signalled throttling
    RateLimited,
    /// Malformed or unsupported request data
    Validation,
    /// Transient transport failure
    Network,
    /// A call exceeded its deadline
    Timeout,
    /// 5xx-equivalent platform failure
    Platform,
    /// Anything that could not be classified
    Unknown,
    /// Rejected locally by an open circuit breaker
    CircuitOpen,
    /// Aborted through a cancellation token
    Cancelled,
    /// Invalid configuration
    Config,
    /// Binding, credential or metrics store failure
    Store,
}

impl ErrorKind {
    /// Whether the retry handler may re-attempt after this kind of failure.
    ///
    /// Authentication is handled separately (one refresh-and-retry outside the
    /// attempt budget) and is therefore not retryable here.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Platform
                | ErrorKind::Unknown
        )
    }

    /// Whether this outcome counts toward a circuit breaker's failure tally.
    pub fn trips_circuit(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Platform | ErrorKind::Unknown
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Platform => "platform",
            ErrorKind::Unknown => "unknown",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Store => "store",
        };
        f.write_str(name)
    }
}

/// Core error type for the adsync engine
///
/// Errors are `Clone` so that one shared credential refresh can hand the same
/// failure to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Platform-side throttling
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Error message
        message: String,
        /// Explicit retry-after hint from the platform
        retry_after: Option<Duration>,
    },

    /// Invalid input or mapping defect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport errors
    #[error("Network error: {0}")]
    Network(String),

    /// Deadline exceeded
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Provider-specific server error
    #[error("Platform error ({platform}): {message}")]
    Platform {
        /// Platform name
        platform: String,
        /// Error message
        message: String,
    },

    /// Circuit breaker rejected the call
    #[error("circuit open for {platform}/{endpoint}")]
    CircuitOpen {
        /// Platform name
        platform: String,
        /// Endpoint name
        endpoint: String,
    },

    /// Work was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Unclassified error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a platform (5xx) error
    pub fn platform(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Platform {
            platform: platform.into(),
            message: message.into(),
        }
    }

    /// Create a circuit-open error
    pub fn circuit_open(platform: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::CircuitOpen {
            platform: platform.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// The classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Network(_) => ErrorKind::Network,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Platform { .. } => ErrorKind::Platform,
            Error::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
            Error::Store(_) => ErrorKind::Store,
            Error::Other(_) => ErrorKind::Unknown,
        }
    }

    /// Explicit retry-after hint carried by the error, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the retry handler may re-attempt after this error
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

/// Classify a native HTTP response status into the error taxonomy.
///
/// Connectors call this once when a non-success response arrives so every
/// platform's failures land in the same [`ErrorKind`]s.
pub fn classify_http_status(
    platform: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Error {
    match status {
        401 | 403 => Error::auth(format!("{} rejected credentials (status {})", platform, status)),
        429 => Error::rate_limited(
            format!("{} throttled the request (status {})", platform, status),
            retry_after,
        ),
        400 | 404 | 409 | 422 => Error::validation(format!(
            "{} rejected the request (status {}): {}",
            platform, status, body
        )),
        408 => Error::network(format!("{} request timeout (status 408)", platform)),
        500..=599 => Error::platform(platform, format!("server error {}: {}", status, body)),
        _ => Error::Other(format!(
            "{} returned unexpected status {}: {}",
            platform, status, body
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Platform.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Authentication.is_retryable());
        assert!(!ErrorKind::CircuitOpen.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn test_circuit_tally_kinds() {
        assert!(ErrorKind::Platform.trips_circuit());
        assert!(ErrorKind::Timeout.trips_circuit());
        assert!(!ErrorKind::Validation.trips_circuit());
        assert!(!ErrorKind::RateLimited.trips_circuit());
        assert!(!ErrorKind::Authentication.trips_circuit());
    }

    #[test]
    fn test_classify_http_status() {
        let hint = Some(Duration::from_secs(7));
        assert_eq!(
            classify_http_status("google", 401, None, "").kind(),
            ErrorKind::Authentication
        );
        let throttled = classify_http_status("google", 429, hint, "");
        assert_eq!(throttled.kind(), ErrorKind::RateLimited);
        assert_eq!(throttled.retry_after(), hint);
        assert_eq!(
            classify_http_status("facebook", 400, None, "bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            classify_http_status("facebook", 503, None, "").kind(),
            ErrorKind::Platform
        );
        assert_eq!(
            classify_http_status("facebook", 302, None, "").kind(),
            ErrorKind::Unknown
        );
    }
}
