//! Credential values and their persisted record format

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Default token type for OAuth access tokens.
pub const BEARER: &str = "Bearer";

/// 9999-12-31T23:59:59Z, used for tokens that carry no expiry.
const FAR_FUTURE_TS: i64 = 253_402_300_799;

fn far_future() -> DateTime<Utc> {
    Utc.timestamp_opt(FAR_FUTURE_TS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole-second expiry so the persisted form (unix seconds) round-trips.
fn expiry_after(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc::now().timestamp().checked_add(secs))
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(far_future)
}

/// A static API key.
#[derive(Debug, Clone)]
pub struct ApiKeyCredential {
    pub key: SecretString,
}

/// An OAuth access token with absolute expiry.
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
}

impl OAuthCredential {
    /// Builds a credential from a token endpoint grant. `expires_in` is
    /// converted to absolute time here so later staleness checks don't
    /// depend on when the grant was received.
    pub fn from_grant(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        token_type: Option<String>,
    ) -> Self {
        let expires_at = expires_in.map(expiry_after).unwrap_or_else(far_future);
        Self {
            access_token: SecretString::new(access_token),
            refresh_token: refresh_token.filter(|t| !t.is_empty()).map(SecretString::new),
            expires_at,
            token_type: token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| BEARER.to_string()),
        }
    }

    /// Wraps a bare access token (e.g. from the environment) that carries no
    /// expiry information.
    pub fn from_access_token(access_token: SecretString) -> Self {
        Self {
            access_token,
            refresh_token: None,
            expires_at: far_future(),
            token_type: BEARER.to_string(),
        }
    }

    /// True once `expires_at` has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True if the token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match Utc::now().checked_add_signed(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }

    /// Seconds until expiry, negative once expired.
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }
}

/// A resolved credential. Exactly one variant is active.
#[derive(Debug, Clone)]
pub enum Credential {
    ApiKey(ApiKeyCredential),
    OAuth(OAuthCredential),
    /// For providers with no identity requirement.
    None,
}

impl Credential {
    /// Shorthand for an API key credential.
    pub fn api_key(key: impl Into<String>) -> Self {
        Credential::ApiKey(ApiKeyCredential {
            key: SecretString::new(key.into()),
        })
    }

    /// The secret to send as a bearer token, if any.
    pub fn bearer(&self) -> Option<&SecretString> {
        match self {
            Credential::ApiKey(c) => Some(&c.key),
            Credential::OAuth(c) => Some(&c.access_token),
            Credential::None => None,
        }
    }

    /// The OAuth payload, if this is an OAuth credential.
    pub fn as_oauth(&self) -> Option<&OAuthCredential> {
        match self {
            Credential::OAuth(c) => Some(c),
            _ => None,
        }
    }

    /// Short label for logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ApiKey(_) => "api_key",
            Credential::OAuth(_) => "oauth",
            Credential::None => "none",
        }
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Credential::ApiKey(a), Credential::ApiKey(b)) => {
                a.key.expose_secret() == b.key.expose_secret()
            }
            (Credential::OAuth(a), Credential::OAuth(b)) => {
                a.access_token.expose_secret() == b.access_token.expose_secret()
                    && a.refresh_token.as_ref().map(|t| t.expose_secret())
                        == b.refresh_token.as_ref().map(|t| t.expose_secret())
                    && a.expires_at == b.expires_at
                    && a.token_type == b.token_type
            }
            (Credential::None, Credential::None) => true,
            _ => false,
        }
    }
}

/// Record type tag of a persisted credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredKind {
    ApiKey,
    #[serde(rename = "oauth")]
    OAuth,
}

/// On-disk form of a credential, one record per provider.
///
/// `expires_at` is unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(rename = "type")]
    pub kind: StoredKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl StoredCredential {
    /// Converts a credential into its record. `Credential::None` has no
    /// persisted form.
    pub fn from_credential(credential: &Credential) -> Option<Self> {
        match credential {
            Credential::ApiKey(c) => Some(Self {
                kind: StoredKind::ApiKey,
                api_key: Some(c.key.expose_secret().clone()),
                access_token: None,
                refresh_token: None,
                expires_at: None,
                token_type: None,
            }),
            Credential::OAuth(c) => Some(Self {
                kind: StoredKind::OAuth,
                api_key: None,
                access_token: Some(c.access_token.expose_secret().clone()),
                refresh_token: c.refresh_token.as_ref().map(|t| t.expose_secret().clone()),
                expires_at: Some(c.expires_at.timestamp()),
                token_type: Some(c.token_type.clone()),
            }),
            Credential::None => None,
        }
    }

    /// Converts the record back into a credential.
    pub fn into_credential(self) -> Result<Credential, AuthError> {
        match self.kind {
            StoredKind::ApiKey => {
                let key = self
                    .api_key
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| AuthError::Validation("stored api_key record has no key".into()))?;
                Ok(Credential::api_key(key))
            }
            StoredKind::OAuth => {
                let access_token = self
                    .access_token
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        AuthError::Validation("stored oauth record has no access_token".into())
                    })?;
                let expires_at = match self.expires_at {
                    Some(ts) => Utc
                        .timestamp_opt(ts, 0)
                        .single()
                        .ok_or_else(|| AuthError::Validation(format!("invalid expires_at {}", ts)))?,
                    None => far_future(),
                };
                Ok(Credential::OAuth(OAuthCredential {
                    access_token: SecretString::new(access_token),
                    refresh_token: self.refresh_token.filter(|t| !t.is_empty()).map(SecretString::new),
                    expires_at,
                    token_type: self.token_type.unwrap_or_else(|| BEARER.to_string()),
                }))
            }
        }
    }
}
