//! Credential bookkeeping for a single streaming call

use chrono::{DateTime, Utc};
use forge_llm::ChatError;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{AuthResolver, Credential};
use crate::error::AuthError;

/// Reactive re-authentications allowed per stream.
pub const MAX_AUTH_RETRIES: u32 = 1;

/// Per-call state, owned by the stream that created it.
#[derive(Debug, Clone)]
pub struct StreamSession {
    provider: String,
    credential: Credential,
    /// When to attempt a proactive refresh; `None` disables it.
    refresh_deadline: Option<DateTime<Utc>>,
    retry_count: u32,
}

impl StreamSession {
    fn new(provider: String, credential: Credential, margin: chrono::Duration) -> Self {
        let mut session = Self {
            provider,
            credential: Credential::None,
            refresh_deadline: None,
            retry_count: 0,
        };
        session.swap(credential, margin);
        session
    }

    fn swap(&mut self, credential: Credential, margin: chrono::Duration) {
        self.refresh_deadline = credential
            .as_oauth()
            .filter(|oauth| oauth.refresh_token.is_some())
            .and_then(|oauth| oauth.expires_at.checked_sub_signed(margin));
        self.credential = credential;
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn refresh_deadline(&self) -> Option<DateTime<Utc>> {
        self.refresh_deadline
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Keeps a [`StreamSession`] authenticated through an [`AuthResolver`].
#[derive(Debug, Clone)]
pub struct StreamingAuthHandler {
    resolver: Arc<AuthResolver>,
}

impl StreamingAuthHandler {
    pub fn new(resolver: Arc<AuthResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<AuthResolver> {
        &self.resolver
    }

    /// Resolves the initial credential for a new stream.
    pub async fn begin(&self, provider: &str) -> Result<StreamSession, AuthError> {
        let credential = self.resolver.resolve(provider).await?;
        let id = self
            .resolver
            .registry()
            .canonical(provider)
            .unwrap_or_else(|| provider.to_string());
        Ok(StreamSession::new(
            id,
            credential,
            self.resolver.settings().refresh_margin(),
        ))
    }

    /// Refreshes the session credential if it is inside the safety margin.
    ///
    /// Failure is not fatal: the current token stays in use until the
    /// provider actually rejects it. Returns whether the credential changed.
    pub async fn refresh_if_needed(&self, session: &mut StreamSession) -> bool {
        let Some(deadline) = session.refresh_deadline else {
            return false;
        };
        if Utc::now() < deadline {
            return false;
        }

        let margin = self.resolver.settings().refresh_margin();
        match self.resolver.refresh(&session.provider).await {
            Ok(credential) if credential != session.credential => {
                debug!("Swapped in refreshed credential for {}", session.provider);
                session.swap(credential, margin);
                true
            }
            Ok(_) => {
                session.refresh_deadline = None;
                false
            }
            Err(e) => {
                warn!(
                    "Proactive token refresh for {} failed, continuing with current token: {}",
                    session.provider, e
                );
                session.refresh_deadline = None;
                false
            }
        }
    }

    /// Handles a provider authentication failure.
    ///
    /// The first failure forces a fresh credential; any later one is
    /// terminal and wraps `cause`.
    pub async fn recover(
        &self,
        session: &mut StreamSession,
        cause: ChatError,
    ) -> Result<(), AuthError> {
        if session.retry_count >= MAX_AUTH_RETRIES {
            return Err(AuthError::authentication_caused_by(
                &session.provider,
                "provider rejected the credential again after re-authentication",
                cause,
            ));
        }
        session.retry_count += 1;
        debug!(
            "Provider {} rejected the credential ({}), re-authenticating",
            session.provider, cause
        );

        let credential = self
            .resolver
            .reacquire(&session.provider, &session.credential)
            .await
            .map_err(|e| match e {
                e @ AuthError::Authentication { .. } => e,
                other => AuthError::authentication_caused_by(
                    &session.provider,
                    "re-authentication after provider rejection failed",
                    other,
                ),
            })?;
        info!("Re-authenticated {} after a rejected credential", session.provider);
        session.swap(credential, self.resolver.settings().refresh_margin());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::{OAuthCredential, BEARER};
    use chrono::TimeZone;
    use secrecy::SecretString;

    fn oauth(expires_in_secs: i64, refresh: bool) -> Credential {
        Credential::OAuth(OAuthCredential {
            access_token: SecretString::new("ghu".to_string()),
            refresh_token: refresh.then(|| SecretString::new("ghr".to_string())),
            expires_at: Utc
                .timestamp_opt(Utc::now().timestamp() + expires_in_secs, 0)
                .unwrap(),
            token_type: BEARER.to_string(),
        })
    }

    #[test]
    fn test_deadline_only_for_refreshable_oauth() {
        let margin = chrono::Duration::seconds(60);
        let session = StreamSession::new("p".into(), oauth(600, true), margin);
        let deadline = session.refresh_deadline().unwrap();
        assert!(deadline < Utc::now() + chrono::Duration::seconds(541));

        let session = StreamSession::new("p".into(), oauth(600, false), margin);
        assert!(session.refresh_deadline().is_none());

        let session = StreamSession::new("p".into(), Credential::api_key("sk"), margin);
        assert!(session.refresh_deadline().is_none());
        assert_eq!(session.retry_count(), 0);
    }
}
