// # Facebook Marketing API Connector
//
// Facebook connector for the adsync engine.
//
// ## Responsibilities
//
// - One Graph API request per connector call
// - Failures classified once: Graph error codes first, HTTP status second
// - NO retry, backoff or rate limiting (owned by the orchestrator)
//
// ## Security Requirements
//
// - App secret and access tokens NEVER appear in logs
// - Tokens travel in the Authorization header, never in query strings
//   (except the token exchange itself, which the API requires)
//
// ## API Reference
//
// - Create campaign: POST `/:version/act_:account_id/campaigns`
// - Update campaign: POST `/:version/:campaign_id`
// - Insights: GET `/:version/:campaign_id/insights`
// - Token exchange: GET `/:version/oauth/access_token`

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

pub use mapper::FacebookMapper;

/// Graph API base URL
const GRAPH_API_BASE: &str = "https://graph.facebook.com";

/// Graph API version used when the config names none
const DEFAULT_API_VERSION: &str = "v19.0";

/// HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Long-lived tokens last about sixty days
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 24 * 60 * 60;

/// Graph error codes with a fixed meaning regardless of HTTP status
const CODE_INVALID_TOKEN: i64 = 190;
const CODE_INVALID_PARAMETER: i64 = 100;
const THROTTLING_CODES: [i64; 4] = [4, 17, 32, 613];

/// Settings for one Facebook ad account
#[derive(Clone)]
pub struct FacebookSettings {
    /// Ad account id without the `act_` prefix
    pub ad_account_id: String,
    pub app_id: String,
    pub app_secret: String,
    pub api_version: String,
    pub base_url: String,
}

impl std::fmt::Debug for FacebookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookSettings")
            .field("ad_account_id", &self.ad_account_id)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<REDACTED>")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Facebook Marketing API connector
#[derive(Debug)]
pub struct FacebookConnector {
    settings: FacebookSettings,
    mapper: FacebookMapper,
    client: reqwest::Client,
}

impl FacebookConnector {
    /// Create a connector
    ///
    /// # Errors
    ///
    /// `Error::Config` if the app secret is empty or the HTTP client cannot be built.
    pub fn new(settings: FacebookSettings) -> Result<Self> {
        if settings.app_secret.is_empty() {
            return Err(Error::config("Facebook app secret is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            mapper: FacebookMapper,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.base_url, self.settings.api_version, path
        )
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
            return Err(classify_graph_error(status.as_u16(), retry_after, &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::platform("facebook", format!("Failed to parse response: {}", e)))
    }

    async fn post(&self, token: &AccessToken, path: &str, body: &Value) -> Result<Value> {
        let request = self
            .client
            .post(self.url(path))
            .bearer_auth(token.secret())
            .json(body);
        self.send(request).await
    }
}

#[async_trait]
impl PlatformConnector for FacebookConnector {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn mapper(&self) -> &dyn AdMapper {
        &self.mapper
    }

    async fn create_campaign(
        &self,
        token: &AccessToken,
        campaign: &MappedCampaign,
    ) -> Result<NativeCampaign> {
        tracing::info!(ad_account = %self.settings.ad_account_id, "Creating Facebook campaign");
        let path = format!("act_{}/campaigns", self.settings.ad_account_id);
        let response = self.post(token, &path, &request_body(campaign)).await?;

        let native_id = response["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::platform("facebook", "create response carries no id"))?
            .to_string();
        tracing::debug!(%native_id, "Facebook campaign created");

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
        tracing::info!(%native_id, "Updating Facebook campaign");
        let response = self.post(token, native_id, &request_body(campaign)).await?;
        ensure_success(&response)?;

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
        tracing::info!(%native_id, %status, "Changing Facebook campaign status");
        let body = json!({ "status": mapper::native_status(status) });
        let response = self.post(token, native_id, &body).await?;
        ensure_success(&response)?;

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
        let time_range = json!({
            "since": range.start().to_string(),
            "until": range.end().to_string(),
        })
        .to_string();
        let request = self
            .client
            .get(self.url(&format!("{}/insights", native_id)))
            .bearer_auth(token.secret())
            .query(&[
                ("fields", "impressions,clicks,spend,actions"),
                ("time_increment", "1"),
                ("time_range", time_range.as_str()),
            ]);
        self.send(request).await
    }

    /// Exchange the current long-lived token for a new one
    async fn refresh_credential(&self, previous: &Credential) -> Result<Credential> {
        if previous.access_token.is_empty() {
            return Err(Error::auth(format!(
                "no Facebook token to exchange for {}; the user must re-authorize",
                previous.key()
            )));
        }

        let request = self.client.get(self.url("oauth/access_token")).query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.settings.app_id.as_str()),
            ("client_secret", self.settings.app_secret.as_str()),
            ("fb_exchange_token", previous.access_token.as_str()),
        ]);
        let response = self.send(request).await?;
        token_response(previous, &response)
    }
}

/// Native body without fields the account already fixes
fn request_body(campaign: &MappedCampaign) -> Value {
    let mut body = campaign.payload.clone();
    if let Some(fields) = body.as_object_mut() {
        // currency is an account setting; it rides along only for from_native
        fields.remove("currency");
    }
    body
}

fn ensure_success(response: &Value) -> Result<()> {
    match response.get("success").and_then(Value::as_bool) {
        Some(false) => Err(Error::platform("facebook", "update was not applied")),
        _ => Ok(()),
    }
}

fn status_of(payload: &Value) -> Result<TargetStatus> {
    payload["status"]
        .as_str()
        .map(mapper::parse_status)
        .unwrap_or(Ok(TargetStatus::Paused))
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(DEFAULT_HTTP_TIMEOUT)
    } else {
        Error::network(format!("Facebook request failed: {}", e))
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

/// Classify a Graph API error response
///
/// The Graph API reports throttling and expired tokens with HTTP 400, so
/// the error code in the body wins over the status.
fn classify_graph_error(status: u16, retry_after: Option<Duration>, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let code = error.and_then(|e| e["code"].as_i64());
    let message = error
        .and_then(|e| e["message"].as_str())
        .unwrap_or(body)
        .to_string();

    match code {
        Some(CODE_INVALID_TOKEN) => Error::auth(format!("Facebook token rejected: {}", message)),
        Some(c) if THROTTLING_CODES.contains(&c) => Error::rate_limited(
            format!("Facebook throttled (code {}): {}", c, message),
            retry_after,
        ),
        Some(CODE_INVALID_PARAMETER) => {
            Error::validation(format!("Facebook rejected parameters: {}", message))
        }
        _ => classify_http_status("facebook", status, retry_after, body),
    }
}

fn token_response(previous: &Credential, response: &Value) -> Result<Credential> {
    let access_token = response["access_token"]
        .as_str()
        .ok_or_else(|| Error::auth("Facebook token response carries no access_token"))?;
    let expires_in = response["expires_in"]
        .as_i64()
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Ok(Credential::new(
        &previous.key(),
        access_token,
        previous.refresh_token.clone(),
        Utc::now() + chrono::Duration::seconds(expires_in),
    ))
}

/// Factory for creating Facebook connectors
pub struct FacebookFactory;

impl ConnectorFactory for FacebookFactory {
    fn create(&self, config: &ConnectorConfig) -> Result<Arc<dyn PlatformConnector>> {
        match config {
            ConnectorConfig::Facebook {
                ad_account_id,
                app_id,
                app_secret,
                api_version,
                base_url,
            } => {
                let settings = FacebookSettings {
                    ad_account_id: ad_account_id.clone(),
                    app_id: app_id.clone(),
                    app_secret: app_secret.clone(),
                    api_version: api_version
                        .clone()
                        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
                    base_url: base_url.clone().unwrap_or_else(|| GRAPH_API_BASE.to_string()),
                };
                Ok(Arc::new(FacebookConnector::new(settings)?))
            }
            _ => Err(Error::config("Invalid config for Facebook connector")),
        }
    }
}

/// Register the Facebook connector with a registry
///
/// # Example
///
/// ```rust
/// use adsync_core::ConnectorRegistry;
///
/// let registry = ConnectorRegistry::new();
/// adsync_connector_facebook::register(&registry);
/// assert!(registry.has_connector("facebook"));
/// ```
pub fn register(registry: &ConnectorRegistry) {
    registry.register_connector("facebook", Box::new(FacebookFactory));
}
