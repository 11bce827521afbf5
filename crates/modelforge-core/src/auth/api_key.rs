//! Static API key and no-auth strategies

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::credential::{ApiKeyCredential, Credential};
use crate::auth::AuthStrategy;
use crate::error::AuthError;

/// Source of a key typed or pasted by a human.
///
/// Returning `Ok(None)` means no key is available (non-interactive use).
#[async_trait]
pub trait ApiKeyPrompt: Send + Sync {
    async fn prompt(&self, provider: &str) -> Result<Option<SecretString>, AuthError>;
}

/// Prompt that never yields a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

#[async_trait]
impl ApiKeyPrompt for NoPrompt {
    async fn prompt(&self, _provider: &str) -> Result<Option<SecretString>, AuthError> {
        Ok(None)
    }
}

/// Acquires a static API key from an [`ApiKeyPrompt`].
#[derive(Clone)]
pub struct ApiKeyAuth {
    prompt: Arc<dyn ApiKeyPrompt>,
    key_prefix: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(prompt: Arc<dyn ApiKeyPrompt>) -> Self {
        Self {
            prompt,
            key_prefix: None,
        }
    }

    /// Expected key prefix, checked advisorily by [`ApiKeyAuth::validate`].
    pub fn with_key_prefix(mut self, prefix: Option<String>) -> Self {
        self.key_prefix = prefix;
        self
    }

    /// Rejects empty keys. A prefix mismatch only warns; key formats
    /// change without notice.
    pub fn validate(&self, provider: &str, key: &SecretString) -> Result<(), AuthError> {
        let value = key.expose_secret();
        if value.trim().is_empty() {
            return Err(AuthError::Validation(format!(
                "API key for {} is empty",
                provider
            )));
        }
        if let Some(prefix) = self.key_prefix.as_deref() {
            if !value.trim().starts_with(prefix) {
                warn!(
                    "API key for {} does not start with the expected prefix {:?}",
                    provider, prefix
                );
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyAuth {
    async fn acquire(&self, provider: &str) -> Result<Credential, AuthError> {
        let Some(key) = self.prompt.prompt(provider).await? else {
            return Err(AuthError::authentication(
                provider,
                "no API key available; set the environment variable or run `modelforge login`",
            ));
        };
        self.validate(provider, &key)?;
        debug!("Accepted API key for {}", provider);
        let key = SecretString::new(key.expose_secret().trim().to_string());
        Ok(Credential::ApiKey(ApiKeyCredential { key }))
    }
}

/// Strategy for providers with no identity requirement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    async fn acquire(&self, _provider: &str) -> Result<Credential, AuthError> {
        Ok(Credential::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPrompt(&'static str);

    #[async_trait]
    impl ApiKeyPrompt for FixedPrompt {
        async fn prompt(&self, _provider: &str) -> Result<Option<SecretString>, AuthError> {
            Ok(Some(SecretString::new(self.0.to_string())))
        }
    }

    fn auth(key: &'static str) -> ApiKeyAuth {
        ApiKeyAuth::new(Arc::new(FixedPrompt(key))).with_key_prefix(Some("sk-".into()))
    }

    #[test]
    fn test_validate_rejects_blank() {
        let auth = auth("");
        for key in ["", "   ", "\t\n"] {
            let err = auth
                .validate("openai", &SecretString::new(key.to_string()))
                .unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)));
        }
    }

    #[test]
    fn test_prefix_mismatch_is_advisory() {
        let auth = auth("");
        auth.validate("openai", &SecretString::new("proj-abc".to_string()))
            .unwrap();
    }

    #[tokio::test]
    async fn test_acquire_trims_key() {
        let credential = auth("  sk-abc \n").acquire("openai").await.unwrap();
        assert_eq!(credential, Credential::api_key("sk-abc"));
    }

    #[tokio::test]
    async fn test_acquire_without_prompt_fails() {
        let err = ApiKeyAuth::new(Arc::new(NoPrompt))
            .acquire("openai")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_validation_error_does_not_echo_key() {
        let err = auth("   ").acquire("openai").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_no_auth() {
        assert_eq!(NoAuth.acquire("ollama").await.unwrap(), Credential::None);
    }
}
