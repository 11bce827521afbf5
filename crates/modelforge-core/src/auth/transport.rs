//! HTTP exchanges with a provider's device-authorization and token endpoints

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::DeviceFlowEndpoints;
use crate::error::AuthError;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const REFRESH_GRANT: &str = "refresh_token";

/// Poll interval used when the provider omits `interval`.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Device authorization response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

/// Token payload from a successful grant.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// One answer from the token endpoint while polling.
#[derive(Debug, Clone)]
pub enum PollResponse {
    Granted(TokenGrant),
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    /// Any other OAuth error code.
    Other {
        code: String,
        description: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl PollResponse {
    fn from_error(body: OAuthErrorBody) -> Self {
        match body.error.as_str() {
            "authorization_pending" => PollResponse::AuthorizationPending,
            "slow_down" => PollResponse::SlowDown,
            "access_denied" => PollResponse::AccessDenied,
            "expired_token" => PollResponse::ExpiredToken,
            _ => PollResponse::Other {
                code: body.error,
                description: body.error_description,
            },
        }
    }
}

/// Network side of the device-authorization grant.
///
/// Implementations report transport failures as [`AuthError::Network`];
/// protocol outcomes are values, not errors. Rejections are reported as
/// [`AuthError::Authentication`] naming the endpoint; callers re-label them
/// with [`AuthError::for_provider`].
#[async_trait]
pub trait DeviceFlowTransport: Send + Sync {
    /// Asks the authorization endpoint for a device code.
    async fn request_code(
        &self,
        endpoints: &DeviceFlowEndpoints,
    ) -> Result<DeviceAuthorization, AuthError>;

    /// Polls the token endpoint once.
    async fn poll_token(
        &self,
        endpoints: &DeviceFlowEndpoints,
        device_code: &str,
    ) -> Result<PollResponse, AuthError>;

    /// Exchanges a refresh token for a new grant.
    async fn refresh(
        &self,
        endpoints: &DeviceFlowEndpoints,
        refresh_token: &SecretString,
    ) -> Result<TokenGrant, AuthError>;
}

/// [`DeviceFlowTransport`] over `reqwest` with form-encoded requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("modelforge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<(u16, serde_json::Value), AuthError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(AuthError::network(format!(
                "token endpoint {} returned server error {}",
                url, status
            )));
        }

        let body = response.text().await?;
        let data = serde_json::from_str(&body).map_err(|e| {
            AuthError::network(format!("unparseable response from {} ({}): {}", url, status, e))
        })?;
        Ok((status, data))
    }
}

#[async_trait]
impl DeviceFlowTransport for HttpTransport {
    async fn request_code(
        &self,
        endpoints: &DeviceFlowEndpoints,
    ) -> Result<DeviceAuthorization, AuthError> {
        let mut form = vec![("client_id", endpoints.client_id.as_str())];
        if let Some(scope) = endpoints.scope.as_deref() {
            form.push(("scope", scope));
        }

        let (status, data) = self.post_form(&endpoints.authorization_url, &form).await?;
        if status != 200 {
            let detail = serde_json::from_value::<OAuthErrorBody>(data)
                .map(|b| b.error)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AuthError::authentication(
                endpoints.authorization_url.clone(),
                format!("device authorization failed with status {}: {}", status, detail),
            ));
        }

        let mut authorization: DeviceAuthorization = serde_json::from_value(data)?;
        authorization.interval = authorization.interval.max(1);
        debug!(
            "Device code issued, expires in {}s, interval {}s",
            authorization.expires_in, authorization.interval
        );
        Ok(authorization)
    }

    async fn poll_token(
        &self,
        endpoints: &DeviceFlowEndpoints,
        device_code: &str,
    ) -> Result<PollResponse, AuthError> {
        let (_, data) = self
            .post_form(
                &endpoints.token_url,
                &[
                    ("client_id", endpoints.client_id.as_str()),
                    ("device_code", device_code),
                    ("grant_type", DEVICE_CODE_GRANT),
                ],
            )
            .await?;

        // Some providers answer 200 with an `error` field, others 400.
        if data.get("access_token").is_some() {
            return Ok(PollResponse::Granted(serde_json::from_value(data)?));
        }
        let body: OAuthErrorBody = serde_json::from_value(data)?;
        Ok(PollResponse::from_error(body))
    }

    async fn refresh(
        &self,
        endpoints: &DeviceFlowEndpoints,
        refresh_token: &SecretString,
    ) -> Result<TokenGrant, AuthError> {
        let (status, data) = self
            .post_form(
                &endpoints.token_url,
                &[
                    ("client_id", endpoints.client_id.as_str()),
                    ("grant_type", REFRESH_GRANT),
                    ("refresh_token", refresh_token.expose_secret()),
                ],
            )
            .await?;

        if data.get("access_token").is_some() {
            return Ok(serde_json::from_value(data)?);
        }
        let code = serde_json::from_value::<OAuthErrorBody>(data)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("status {}", status));
        Err(AuthError::authentication(
            endpoints.token_url.clone(),
            format!("token refresh rejected: {}", code),
        ))
    }
}
