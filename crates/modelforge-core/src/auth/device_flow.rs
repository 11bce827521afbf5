//! OAuth2 device-authorization grant

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::credential::{Credential, OAuthCredential};
use crate::auth::events::{AuthEvent, AuthEventSink, LogSink};
use crate::auth::transport::{DeviceFlowTransport, PollResponse};
use crate::auth::AuthStrategy;
use crate::config::{AuthSettings, DeviceFlowEndpoints};
use crate::error::AuthError;

/// Upper bound on a device code's lifetime and poll interval, whatever
/// the authorization server reports.
pub const MAX_DEVICE_CODE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Where a login attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFlowState {
    NotStarted,
    CodeRequested,
    Polling,
    Authorized,
    Denied,
    Expired,
    Cancelled,
    Error,
}

impl DeviceFlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceFlowState::Authorized
                | DeviceFlowState::Denied
                | DeviceFlowState::Expired
                | DeviceFlowState::Cancelled
                | DeviceFlowState::Error
        )
    }
}

/// In-memory state of one login attempt. Never persisted.
#[derive(Debug, Clone)]
pub struct DeviceFlowSession {
    pub provider: String,
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub poll_interval: Duration,
    pub expires_at: Instant,
    /// Token endpoint polls made so far, not counting network retries.
    pub attempts: u32,
    pub state: DeviceFlowState,
}

impl DeviceFlowSession {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// URL to show the user, preferring the one with the code pre-filled.
    pub fn display_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Runs the device flow against one provider's endpoints.
#[derive(Clone)]
pub struct DeviceFlowAuth {
    endpoints: DeviceFlowEndpoints,
    transport: Arc<dyn DeviceFlowTransport>,
    events: Arc<dyn AuthEventSink>,
    settings: AuthSettings,
    cancel: CancellationToken,
}

impl DeviceFlowAuth {
    pub fn new(endpoints: DeviceFlowEndpoints, transport: Arc<dyn DeviceFlowTransport>) -> Self {
        Self {
            endpoints,
            transport,
            events: Arc::new(LogSink),
            settings: AuthSettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn AuthEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Token observed by [`AuthStrategy::acquire`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Requests a device code and tells the user where to enter it.
    pub async fn start(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<DeviceFlowSession, AuthError> {
        self.events
            .emit(AuthEvent::info(format!("Requesting device code for {}", provider)));

        let authorization = self
            .with_network_retries(provider, cancel, || {
                self.transport.request_code(&self.endpoints)
            })
            .await
            .map_err(|e| {
                self.events.emit(AuthEvent::error(e.to_string()));
                e.for_provider(provider)
                    .escalate(provider, "requesting a device code failed")
            })?;

        let session = DeviceFlowSession {
            provider: provider.to_string(),
            device_code: authorization.device_code,
            user_code: authorization.user_code,
            verification_uri: authorization.verification_uri,
            verification_uri_complete: authorization.verification_uri_complete,
            poll_interval: Duration::from_secs(authorization.interval.max(1))
                .min(MAX_DEVICE_CODE_LIFETIME),
            expires_at: Instant::now()
                + Duration::from_secs(authorization.expires_in).min(MAX_DEVICE_CODE_LIFETIME),
            attempts: 0,
            state: DeviceFlowState::CodeRequested,
        };

        self.events.emit(AuthEvent::verification_url(
            session.display_uri(),
            session.user_code.clone(),
        ));
        self.events
            .emit(AuthEvent::waiting("Waiting for user authorization..."));
        Ok(session)
    }

    /// Polls until the session reaches a terminal state.
    ///
    /// The interval only ever grows, and only on `slow_down`.
    pub async fn poll(
        &self,
        session: &mut DeviceFlowSession,
        cancel: &CancellationToken,
    ) -> Result<OAuthCredential, AuthError> {
        let provider = session.provider.clone();
        session.state = DeviceFlowState::Polling;

        let result = loop {
            if cancel.is_cancelled() {
                break Err(self.cancelled(session));
            }
            if session.is_expired() {
                session.state = DeviceFlowState::Expired;
                break Err(AuthError::authentication(
                    &provider,
                    "device code expired before authorization; run `modelforge login` to start again",
                ));
            }

            session.attempts += 1;
            debug!("Polling token endpoint for {} (attempt {})", provider, session.attempts);
            let device_code = session.device_code.clone();
            let response = self
                .with_network_retries(&provider, cancel, || {
                    self.transport.poll_token(&self.endpoints, &device_code)
                })
                .await;

            match response {
                Ok(PollResponse::Granted(grant)) => {
                    session.state = DeviceFlowState::Authorized;
                    break Ok(OAuthCredential::from_grant(
                        grant.access_token,
                        grant.refresh_token,
                        grant.expires_in,
                        grant.token_type,
                    ));
                }
                Ok(PollResponse::AuthorizationPending) => {}
                Ok(PollResponse::SlowDown) => {
                    session.poll_interval = session
                        .poll_interval
                        .saturating_add(self.settings.slow_down_increment())
                        .min(MAX_DEVICE_CODE_LIFETIME);
                    debug!(
                        "Token endpoint asked {} to slow down, interval now {:?}",
                        provider, session.poll_interval
                    );
                }
                Ok(PollResponse::AccessDenied) => {
                    session.state = DeviceFlowState::Denied;
                    break Err(AuthError::authentication(&provider, "authorization was denied"));
                }
                Ok(PollResponse::ExpiredToken) => {
                    session.state = DeviceFlowState::Expired;
                    break Err(AuthError::authentication(
                        &provider,
                        "device code expired; run `modelforge login` to start again",
                    ));
                }
                Ok(PollResponse::Other { code, description }) => {
                    session.state = DeviceFlowState::Error;
                    let message = match description {
                        Some(d) => format!("token endpoint returned {}: {}", code, d),
                        None => format!("token endpoint returned {}", code),
                    };
                    break Err(AuthError::authentication(&provider, message));
                }
                Err(AuthError::Cancelled { .. }) => break Err(self.cancelled(session)),
                Err(e) => {
                    session.state = DeviceFlowState::Error;
                    break Err(e
                        .for_provider(&provider)
                        .escalate(&provider, "polling the token endpoint failed"));
                }
            }

            // Never sleep past the device code's lifetime.
            let wait = session
                .poll_interval
                .min(session.expires_at.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = cancel.cancelled() => break Err(self.cancelled(session)),
                _ = sleep(wait) => {}
            }
        };

        match &result {
            Ok(_) => {
                info!("Device authorization for {} completed", provider);
                self.events
                    .emit(AuthEvent::success(format!("Logged in to {}", provider)));
            }
            Err(e) => self.events.emit(AuthEvent::error(e.to_string())),
        }
        result
    }

    /// Full login: [`start`](Self::start) then [`poll`](Self::poll).
    pub async fn login(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<OAuthCredential, AuthError> {
        let mut session = self.start(provider, cancel).await?;
        self.poll(&mut session, cancel).await
    }

    /// Exchanges the refresh token of `credential` for a fresh access token.
    ///
    /// A grant without a new refresh token keeps the old one.
    pub async fn refresh(
        &self,
        provider: &str,
        credential: &OAuthCredential,
    ) -> Result<OAuthCredential, AuthError> {
        let Some(refresh_token) = credential.refresh_token.as_ref() else {
            return Err(AuthError::authentication(provider, "no refresh token available"));
        };

        let grant = self
            .with_network_retries(provider, &self.cancel, || {
                self.transport.refresh(&self.endpoints, refresh_token)
            })
            .await
            .map_err(|e| {
                e.for_provider(provider)
                    .escalate(provider, "token refresh failed")
            })?;

        let mut refreshed = OAuthCredential::from_grant(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            grant.token_type,
        );
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = credential.refresh_token.clone();
        }
        info!("Refreshed access token for {}", provider);
        Ok(refreshed)
    }

    fn cancelled(&self, session: &mut DeviceFlowSession) -> AuthError {
        session.state = DeviceFlowState::Cancelled;
        AuthError::Cancelled {
            provider: session.provider.clone(),
        }
    }

    /// Runs `op`, retrying network failures with a fixed backoff.
    async fn with_network_retries<T, F, Fut>(
        &self,
        provider: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, AuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let budget = self.settings.network_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AuthError::Cancelled { provider: provider.to_string() });
                }
                result = op() => result,
            };
            match result {
                Err(e) if e.is_retryable() && attempt < budget => {
                    debug!(
                        "Network error talking to {} (attempt {}/{}): {}",
                        provider, attempt, budget, e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(AuthError::Cancelled { provider: provider.to_string() });
                        }
                        _ = sleep(self.settings.network_backoff()) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for DeviceFlowAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFlowAuth")
            .field("endpoints", &self.endpoints)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for DeviceFlowAuth {
    async fn acquire(&self, provider: &str) -> Result<Credential, AuthError> {
        let cancel = self.cancel.clone();
        self.login(provider, &cancel).await.map(Credential::OAuth)
    }
}
