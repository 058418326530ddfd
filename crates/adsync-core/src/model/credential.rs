//! Per-user, per-platform credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// Cache and store key for a credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialKey {
    pub user_id: String,
    pub platform: Platform,
}

impl CredentialKey {
    pub fn new(user_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.platform)
    }
}

/// Bearer token handed to connectors
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw secret, for building an Authorization header only
    pub fn secret(&self) -> &str {
        &self.0
    }
}

// Tokens never appear in logs
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<REDACTED>)")
    }
}

/// Opaque secret material for one (user, platform)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub platform: Platform,
    pub access_token: String,
    /// Long-lived secret used by the platform's refresh flow
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Cleared when a refresh replaces this credential
    pub valid: bool,
}

impl Credential {
    pub fn new(
        key: &CredentialKey,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: key.user_id.clone(),
            platform: key.platform,
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            valid: true,
        }
    }

    pub fn key(&self) -> CredentialKey {
        CredentialKey::new(self.user_id.clone(), self.platform)
    }

    /// Whether this credential may be served, given a safety margin before expiry
    pub fn is_usable(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.valid && self.expires_at - margin > now
    }

    pub fn token(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("access_token", &"<REDACTED>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<REDACTED>"))
            .field("expires_at", &self.expires_at)
            .field("valid", &self.valid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_respects_margin() {
        let key = CredentialKey::new("u1", Platform::Google);
        let now = Utc::now();
        let cred = Credential::new(&key, "tok", None, now + chrono::Duration::seconds(30));

        assert!(cred.is_usable(now, chrono::Duration::seconds(10)));
        assert!(!cred.is_usable(now, chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_secrets_not_exposed_in_debug() {
        let key = CredentialKey::new("u1", Platform::Facebook);
        let cred = Credential::new(&key, "secret_abc", Some("refresh_xyz".into()), Utc::now());
        let debug_str = format!("{:?} {:?}", cred, cred.token());

        assert!(!debug_str.contains("secret_abc"));
        assert!(!debug_str.contains("refresh_xyz"));
        assert!(debug_str.contains("Credential"));
    }
}
