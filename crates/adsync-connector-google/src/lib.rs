// # Google Ads Connector
//
// Google Ads connector for the adsync engine.
//
// ## Responsibilities
//
// - One HTTP request per connector call
// - Failures classified once via `classify_http_status`
// - NO retry, backoff or rate limiting (owned by the orchestrator)
// - NO background tasks
//
// ## Security Requirements
//
// - Developer token, client secret and access tokens NEVER appear in logs
// - Configuration fails fast if any secret is empty
//
// ## API Reference
//
// - Mutate campaigns: POST `/customers/:customer_id/campaigns:mutate`
// - Reporting: POST `/customers/:customer_id/googleAds:searchStream`
// - OAuth refresh: POST `https://oauth2.googleapis.com/token`

pub mod mapper;

use adsync_core::config::ConnectorConfig;
use adsync_core::model::{AccessToken, Credential, DateRange, Platform, TargetStatus};
use adsync_core::traits::{
    AdMapper, ConnectorFactory, MappedCampaign, NativeCampaign, PlatformConnector,
};
use adsync_core::{ConnectorRegistry, Error, Result, classify_http_status};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub use mapper::GoogleAdsMapper;

/// Google Ads REST API base URL
const GOOGLE_ADS_API_BASE: &str = "https://googleads.googleapis.com/v17";

/// OAuth 2.0 token endpoint
const GOOGLE_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one Google Ads account
#[derive(Clone)]
pub struct GoogleAdsSettings {
    pub developer_token: String,
    /// Customer id, digits only
    pub customer_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub login_customer_id: Option<String>,
    pub base_url: String,
    pub token_url: String,
}

// Secrets stay out of Debug output
impl std::fmt::Debug for GoogleAdsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAdsSettings")
            .field("developer_token", &"<REDACTED>")
            .field("customer_id", &self.customer_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("login_customer_id", &self.login_customer_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Google Ads connector
///
/// Stateless apart from the HTTP client; every call is single-shot.
#[derive(Debug)]
pub struct GoogleAdsConnector {
    settings: GoogleAdsSettings,
    mapper: GoogleAdsMapper,
    client: reqwest::Client,
}

impl GoogleAdsConnector {
    /// Create a connector
    ///
    /// # Errors
    ///
    /// `Error::Config` if a secret is empty or the HTTP client cannot be built.
    pub fn new(settings: GoogleAdsSettings) -> Result<Self> {
        if settings.developer_token.is_empty() || settings.client_secret.is_empty() {
            return Err(Error::config("Google developer token and client secret are required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            mapper: GoogleAdsMapper,
            client,
        })
    }

    fn resource_name(&self, native_id: &str) -> String {
        format!("customers/{}/campaigns/{}", self.settings.customer_id, native_id)
    }

    fn mutate_url(&self) -> String {
        format!(
            "{}/customers/{}/campaigns:mutate",
            self.settings.base_url, self.settings.customer_id
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder, token: &AccessToken) -> reqwest::RequestBuilder {
        let request = request
            .bearer_auth(token.secret())
            .header("developer-token", &self.settings.developer_token);
        match &self.settings.login_customer_id {
            Some(login) => request.header("login-customer-id", login),
            None => request,
        }
    }

    /// Send a request and classify any failure
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(classify_http_status("google", status.as_u16(), retry_after, &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::platform("google", format!("Failed to parse response: {}", e)))
    }

    /// Run one mutate operation and return the affected campaign id
    async fn mutate(&self, token: &AccessToken, operation: Value) -> Result<String> {
        let request = self
            .client
            .post(self.mutate_url())
            .json(&json!({ "operations": [operation] }));
        let response = self.send(self.authorized(request, token)).await?;
        campaign_id(&response)
    }
}

#[async_trait]
impl PlatformConnector for GoogleAdsConnector {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn mapper(&self) -> &dyn AdMapper {
        &self.mapper
    }

    async fn create_campaign(
        &self,
        token: &AccessToken,
        campaign: &MappedCampaign,
    ) -> Result<NativeCampaign> {
        tracing::info!(customer_id = %self.settings.customer_id, "Creating Google Ads campaign");
        let native_id = self
            .mutate(token, json!({ "create": campaign.payload }))
            .await?;
        tracing::debug!(%native_id, "Google Ads campaign created");

        Ok(NativeCampaign {
            native_id,
            status: status_of(&campaign.payload)?,
        })
    }

    async fn update_campaign(
        &self,
        token: &AccessToken,
        native_id: &str,
        campaign: &MappedCampaign,
    ) -> Result<NativeCampaign> {
        tracing::info!(%native_id, "Updating Google Ads campaign");
        let mut update = campaign.payload.clone();
        update["resourceName"] = json!(self.resource_name(native_id));

        self.mutate(
            token,
            json!({ "update": update, "updateMask": update_mask(&campaign.payload) }),
        )
        .await?;

        Ok(NativeCampaign {
            native_id: native_id.to_string(),
            status: status_of(&campaign.payload)?,
        })
    }

    async fn set_status(
        &self,
        token: &AccessToken,
        native_id: &str,
        status: TargetStatus,
    ) -> Result<NativeCampaign> {
        tracing::info!(%native_id, %status, "Changing Google Ads campaign status");
        let operation = match status {
            // removal is the only way to retire a Google campaign
            TargetStatus::Archived => json!({ "remove": self.resource_name(native_id) }),
            TargetStatus::Active | TargetStatus::Paused => json!({
                "update": {
                    "resourceName": self.resource_name(native_id),
                    "status": mapper::native_status(status),
                },
                "updateMask": "status",
            }),
        };
        self.mutate(token, operation).await?;

        Ok(NativeCampaign {
            native_id: native_id.to_string(),
            status,
        })
    }

    async fn fetch_metrics(
        &self,
        token: &AccessToken,
        native_id: &str,
        range: &DateRange,
    ) -> Result<Value> {
        let query = format!(
            "SELECT segments.date, metrics.impressions, metrics.clicks, metrics.cost_micros, \
             metrics.conversions FROM campaign WHERE campaign.id = {} \
             AND segments.date BETWEEN '{}' AND '{}'",
            native_id,
            range.start(),
            range.end()
        );
        let url = format!(
            "{}/customers/{}/googleAds:searchStream",
            self.settings.base_url, self.settings.customer_id
        );
        let request = self.client.post(url).json(&json!({ "query": query }));
        self.send(self.authorized(request, token)).await
    }

    async fn refresh_credential(&self, previous: &Credential) -> Result<Credential> {
        let refresh_token = previous.refresh_token.as_deref().ok_or_else(|| {
            Error::auth(format!(
                "no Google refresh token for {}; the user must re-authorize",
                previous.key()
            ))
        })?;

        let request = self.client.post(&self.settings.token_url).form(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ]);
        let response = self.send(request).await?;
        token_response(previous, &response)
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(DEFAULT_HTTP_TIMEOUT)
    } else {
        Error::network(format!("Google Ads request failed: {}", e))
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extract the campaign id from `results[0].resourceName`
fn campaign_id(response: &Value) -> Result<String> {
    response["results"][0]["resourceName"]
        .as_str()
        .and_then(|name| name.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::platform("google", "mutate response carries no resource name"))
}

fn status_of(payload: &Value) -> Result<TargetStatus> {
    payload["campaign"]["status"]
        .as_str()
        .map(mapper::parse_status)
        .unwrap_or(Ok(TargetStatus::Paused))
}

/// Top-level payload sections being replaced
fn update_mask(payload: &Value) -> String {
    payload
        .as_object()
        .map(|sections| sections.keys().cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default()
}

fn token_response(previous: &Credential, response: &Value) -> Result<Credential> {
    let access_token = response["access_token"]
        .as_str()
        .ok_or_else(|| Error::auth("Google token response carries no access_token"))?;
    let expires_in = response["expires_in"].as_i64().unwrap_or(3600);

    let mut fresh = Credential::new(
        &previous.key(),
        access_token,
        previous.refresh_token.clone(),
        Utc::now() + chrono::Duration::seconds(expires_in),
    );
    // Google may rotate the refresh token
    if let Some(rotated) = response["refresh_token"].as_str() {
        fresh.refresh_token = Some(rotated.to_string());
    }
    Ok(fresh)
}

/// Factory for creating Google Ads connectors
pub struct GoogleAdsFactory;

impl ConnectorFactory for GoogleAdsFactory {
    fn create(&self, config: &ConnectorConfig) -> Result<Arc<dyn PlatformConnector>> {
        match config {
            ConnectorConfig::Google {
                developer_token,
                customer_id,
                client_id,
                client_secret,
                login_customer_id,
                base_url,
            } => {
                let settings = GoogleAdsSettings {
                    developer_token: developer_token.clone(),
                    customer_id: customer_id.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    login_customer_id: login_customer_id.clone(),
                    base_url: base_url
                        .clone()
                        .unwrap_or_else(|| GOOGLE_ADS_API_BASE.to_string()),
                    token_url: GOOGLE_OAUTH_TOKEN_URL.to_string(),
                };
                Ok(Arc::new(GoogleAdsConnector::new(settings)?))
            }
            _ => Err(Error::config("Invalid config for Google Ads connector")),
        }
    }
}

/// Register the Google Ads connector with a registry
///
/// # Example
///
/// ```rust
/// use adsync_core::ConnectorRegistry;
///
/// let registry = ConnectorRegistry::new();
/// adsync_connector_google::register(&registry);
/// assert!(registry.has_connector("google"));
/// ```
pub fn register(registry: &ConnectorRegistry) {
    registry.register_connector("google", Box::new(GoogleAdsFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsync_core::ErrorKind;
    use adsync_core::model::CredentialKey;

    fn config() -> ConnectorConfig {
        ConnectorConfig::Google {
            developer_token: "dev-token-secret".to_string(),
            customer_id: "1234567890".to_string(),
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "client-secret-value".to_string(),
            login_customer_id: None,
            base_url: None,
        }
    }

    fn connector() -> GoogleAdsConnector {
        let settings = GoogleAdsSettings {
            developer_token: "dev-token-secret".to_string(),
            customer_id: "1234567890".to_string(),
            client_id: "client".to_string(),
            client_secret: "client-secret-value".to_string(),
            login_customer_id: Some("999".to_string()),
            base_url: GOOGLE_ADS_API_BASE.to_string(),
            token_url: GOOGLE_OAUTH_TOKEN_URL.to_string(),
        };
        GoogleAdsConnector::new(settings).unwrap()
    }

    #[test]
    fn test_factory_creation() {
        let connector = GoogleAdsFactory.create(&config()).unwrap();
        assert_eq!(connector.platform(), Platform::Google);
        assert_eq!(connector.mapper().platform(), Platform::Google);
    }

    #[test]
    fn test_factory_rejects_other_configs() {
        let config = ConnectorConfig::Facebook {
            ad_account_id: "1".to_string(),
            app_id: "a".to_string(),
            app_secret: "s".to_string(),
            api_version: None,
            base_url: None,
        };
        assert!(GoogleAdsFactory.create(&config).is_err());
    }

    #[test]
    fn test_registry_builds_google() {
        let registry = ConnectorRegistry::new();
        register(&registry);
        let set = registry.build_set(&[config()]).unwrap();
        assert_eq!(set.platforms(), vec![Platform::Google]);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut settings = connector().settings;
        settings.client_secret.clear();
        assert!(GoogleAdsConnector::new(settings).is_err());
    }

    #[test]
    fn test_secrets_not_exposed_in_debug() {
        let debug_str = format!("{:?}", connector());
        assert!(!debug_str.contains("dev-token-secret"));
        assert!(!debug_str.contains("client-secret-value"));
        assert!(debug_str.contains("GoogleAdsConnector"));
    }

    #[test]
    fn test_campaign_id_from_resource_name() {
        let response = json!({ "results": [{ "resourceName": "customers/1234567890/campaigns/555" }] });
        assert_eq!(campaign_id(&response).unwrap(), "555");

        let err = campaign_id(&json!({ "results": [] })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Platform);
    }

    #[test]
    fn test_update_mask_lists_sections() {
        let payload = json!({ "campaign": {}, "campaignBudget": {} });
        assert_eq!(update_mask(&payload), "campaign,campaignBudget");
    }

    #[test]
    fn test_token_response_keeps_refresh_token() {
        let key = CredentialKey::new("user-1", Platform::Google);
        let previous = Credential::new(&key, "old", Some("refresh-1".to_string()), Utc::now());

        let fresh = token_response(
            &previous,
            &json!({ "access_token": "new", "expires_in": 3599, "token_type": "Bearer" }),
        )
        .unwrap();
        assert_eq!(fresh.access_token, "new");
        assert_eq!(fresh.refresh_token.as_deref(), Some("refresh-1"));
        assert!(fresh.expires_at > Utc::now() + chrono::Duration::minutes(59));

        let err = token_response(&previous, &json!({ "error": "invalid_grant" })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_authentication_error() {
        let key = CredentialKey::new("user-1", Platform::Google);
        let previous = Credential::new(&key, "old", None, Utc::now());

        let err = connector().refresh_credential(&previous).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
