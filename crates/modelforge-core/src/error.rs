//! Error types for credential resolution

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the authentication subsystem.
///
/// Messages never include secret values; variants carry provider ids and
/// protocol error codes only.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad local input (e.g. an empty API key). Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// No usable credential could be produced; the user has to log in or
    /// fix configuration.
    #[error("authentication failed for {provider}: {message}")]
    Authentication {
        provider: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Transport failure talking to a token endpoint.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The caller cancelled an in-progress login.
    #[error("login for {provider} was cancelled")]
    Cancelled { provider: String },

    /// The provider id is not present in the registry.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The credential store could not be written.
    #[error("credential storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Builds an [`AuthError::Authentication`] without an underlying cause.
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Authentication {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Builds an [`AuthError::Authentication`] wrapping `source`.
    pub fn authentication_caused_by(
        provider: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        AuthError::Authentication {
            provider: provider.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Builds an [`AuthError::Network`] without an underlying cause.
    pub fn network(message: impl Into<String>) -> Self {
        AuthError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network { .. })
    }

    /// Re-labels an authentication failure with the provider it concerns.
    pub fn for_provider(self, provider: &str) -> Self {
        match self {
            AuthError::Authentication {
                message, source, ..
            } => AuthError::Authentication {
                provider: provider.to_string(),
                message,
                source,
            },
            other => other,
        }
    }

    /// Escalates a network failure that exhausted its retry budget.
    pub fn escalate(self, provider: &str, context: &str) -> Self {
        match self {
            AuthError::Network { .. } => {
                let message = format!("{}: {}", context, self);
                AuthError::authentication_caused_by(provider, message, self)
            }
            other => other,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL in its message, never the form body.
        AuthError::Network {
            message: if err.is_timeout() {
                "request timed out".to_string()
            } else {
                err.to_string()
            },
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_only_network_is_retryable() {
        assert!(AuthError::network("reset").is_retryable());
        assert!(!AuthError::Validation("empty".into()).is_retryable());
        assert!(!AuthError::authentication("openai", "denied").is_retryable());
    }

    #[test]
    fn test_escalate_keeps_network_cause() {
        let err = AuthError::network("connection refused").escalate("github-copilot", "polling failed");
        match &err {
            AuthError::Authentication { provider, message, .. } => {
                assert_eq!(provider, "github-copilot");
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_for_provider_relabels() {
        let err = AuthError::authentication("https://example.com/token", "rejected")
            .for_provider("github-copilot");
        assert_eq!(
            err.to_string(),
            "authentication failed for github-copilot: rejected"
        );
    }

    #[test]
    fn test_escalate_passes_other_errors_through() {
        let err = AuthError::Validation("empty".into()).escalate("openai", "ctx");
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
