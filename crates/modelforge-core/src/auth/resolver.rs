//! Credential resolution: environment, then store, then strategy

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::api_key::{ApiKeyAuth, ApiKeyPrompt, NoAuth, NoPrompt};
use crate::auth::credential::{Credential, OAuthCredential};
use crate::auth::device_flow::DeviceFlowAuth;
use crate::auth::env::EnvironmentResolver;
use crate::auth::events::{AuthEventSink, LogSink};
use crate::auth::store::{CredentialStore, FileCredentialStore};
use crate::auth::transport::{DeviceFlowTransport, HttpTransport};
use crate::auth::AuthStrategy;
use crate::config::{AuthSettings, Config, ProviderAuthConfig, ProviderRegistry, Strategy};
use crate::error::AuthError;

/// Where the credential for a provider would currently come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Stored { kind: &'static str, expired: bool },
    NotConfigured,
    NotRequired,
}

/// Builder for [`AuthResolver`]; unset collaborators get production defaults.
pub struct AuthResolverBuilder {
    registry: ProviderRegistry,
    settings: AuthSettings,
    env: Option<EnvironmentResolver>,
    store: Option<Arc<dyn CredentialStore>>,
    transport: Option<Arc<dyn DeviceFlowTransport>>,
    prompt: Option<Arc<dyn ApiKeyPrompt>>,
    events: Option<Arc<dyn AuthEventSink>>,
}

impl AuthResolverBuilder {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            settings: AuthSettings::default(),
            env: None,
            store: None,
            transport: None,
            prompt: None,
            events: None,
        }
    }

    pub fn settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn env(mut self, env: EnvironmentResolver) -> Self {
        self.env = Some(env);
        self
    }

    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn DeviceFlowTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn ApiKeyPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn events(mut self, events: Arc<dyn AuthEventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<AuthResolver, AuthError> {
        let store: Arc<dyn CredentialStore> = match self.store {
            Some(store) => store,
            None => Arc::new(match &self.settings.credentials_dir {
                Some(dir) => FileCredentialStore::with_dir(dir),
                None => FileCredentialStore::new(),
            }),
        };
        let transport: Arc<dyn DeviceFlowTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.settings.token_timeout())?),
        };

        Ok(AuthResolver {
            registry: self.registry,
            env: self.env.unwrap_or_default(),
            store,
            transport,
            prompt: self.prompt.unwrap_or_else(|| Arc::new(NoPrompt)),
            events: self.events.unwrap_or_else(|| Arc::new(LogSink)),
            settings: self.settings,
            locks: Mutex::new(HashMap::new()),
        })
    }
}

/// Resolves one usable credential per provider.
///
/// Holds no credential copies between calls; the store is the only owner,
/// so changes made elsewhere are seen on the next resolution.
pub struct AuthResolver {
    registry: ProviderRegistry,
    env: EnvironmentResolver,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn DeviceFlowTransport>,
    prompt: Arc<dyn ApiKeyPrompt>,
    events: Arc<dyn AuthEventSink>,
    settings: AuthSettings,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AuthResolver {
    pub fn builder(registry: ProviderRegistry) -> AuthResolverBuilder {
        AuthResolverBuilder::new(registry)
    }

    /// Builder seeded with the providers and settings of `config`.
    pub fn from_config(config: &Config) -> AuthResolverBuilder {
        AuthResolverBuilder::new(config.registry()).settings(config.auth.clone())
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Resolves the credential for `provider` (id or alias).
    pub async fn resolve(&self, provider: &str) -> Result<Credential, AuthError> {
        self.resolve_with_cancel(provider, &CancellationToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve); `cancel` aborts an interactive login.
    pub async fn resolve_with_cancel(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let config = self.provider_config(provider)?;
        let id = config.provider_id.as_str();

        if let Some(credential) = self.env_credential(config) {
            debug!("Using {} credential for {} from environment", credential.kind(), id);
            return Ok(credential);
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        match self.store.get(id) {
            Some(Credential::OAuth(oauth)) if oauth.is_expired() => {
                debug!("Stored token for {} has expired", id);
                match self.refresh_stored(config, &oauth).await {
                    Ok(credential) => return Ok(credential),
                    Err(e) => debug!("Silent refresh for {} failed: {}", id, e),
                }
            }
            Some(credential) => {
                debug!("Using stored {} credential for {}", credential.kind(), id);
                return Ok(credential);
            }
            None => {}
        }

        self.acquire(config, cancel).await
    }

    /// Refreshes the stored OAuth token for `provider` if it is close to
    /// expiry, returning whatever is current afterwards.
    pub async fn refresh(&self, provider: &str) -> Result<Credential, AuthError> {
        let config = self.provider_config(provider)?;
        let id = config.provider_id.as_str();

        if let Some(credential) = self.env_credential(config) {
            return Ok(credential);
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        match self.store.get(id) {
            Some(Credential::OAuth(oauth)) => {
                if !oauth.expires_within(self.settings.refresh_margin()) {
                    debug!("Token for {} was already refreshed", id);
                    return Ok(Credential::OAuth(oauth));
                }
                self.refresh_stored(config, &oauth).await
            }
            Some(other) => Ok(other),
            None => Err(AuthError::authentication(
                id,
                "no stored credential to refresh; run `modelforge login`",
            )),
        }
    }

    /// Forces a fresh credential after the provider rejected `stale`.
    ///
    /// Tries the environment, then a refresh of the stored token, then a
    /// full acquisition with the stored record discarded. If the store
    /// already holds something other than `stale`, that is returned.
    pub async fn reacquire(
        &self,
        provider: &str,
        stale: &Credential,
    ) -> Result<Credential, AuthError> {
        let config = self.provider_config(provider)?;
        let id = config.provider_id.as_str();

        if let Some(credential) = self.env_credential(config) {
            return Ok(credential);
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let stored = self.store.get(id);
        if let Some(current) = &stored {
            if current != stale {
                debug!("Credential for {} was replaced concurrently", id);
                return Ok(current.clone());
            }
        }
        if let Some(Credential::OAuth(oauth)) = &stored {
            if oauth.refresh_token.is_some() {
                match self.refresh_stored(config, oauth).await {
                    Ok(credential) => return Ok(credential),
                    Err(e) => debug!("Forced refresh for {} failed: {}", id, e),
                }
            }
        }

        self.store.delete(id)?;
        self.acquire(config, &CancellationToken::new()).await
    }

    /// Runs the provider's strategy regardless of what is stored.
    pub async fn login(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let config = self.provider_config(provider)?;
        let lock = self.lock_for(&config.provider_id);
        let _guard = lock.lock().await;
        self.acquire(config, cancel).await
    }

    /// Deletes the stored credential. Returns whether one existed.
    pub async fn logout(&self, provider: &str) -> Result<bool, AuthError> {
        let config = self.provider_config(provider)?;
        let id = config.provider_id.as_str();
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let existed = self.store.get(id).is_some();
        self.store.delete(id)?;
        if existed {
            info!("Logged out of {}", id);
        }
        Ok(existed)
    }

    /// Reports where the credential would come from, without network calls.
    pub fn status(&self, provider: &str) -> Result<CredentialSource, AuthError> {
        let config = self.provider_config(provider)?;
        if config.strategy == Strategy::None {
            return Ok(CredentialSource::NotRequired);
        }
        if self.env_credential(config).is_some() {
            return Ok(CredentialSource::Environment);
        }
        Ok(match self.store.get(&config.provider_id) {
            Some(credential) => CredentialSource::Stored {
                kind: credential.kind(),
                expired: credential.as_oauth().is_some_and(OAuthCredential::is_expired),
            },
            None => CredentialSource::NotConfigured,
        })
    }

    fn provider_config(&self, provider: &str) -> Result<&ProviderAuthConfig, AuthError> {
        self.registry
            .get(provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))
    }

    fn lock_for(&self, provider: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(provider.to_string()).or_default().clone()
    }

    fn env_credential(&self, config: &ProviderAuthConfig) -> Option<Credential> {
        let id = config.provider_id.as_str();
        match config.strategy {
            Strategy::ApiKey => self.env.api_key(id).map(|key| {
                Credential::ApiKey(crate::auth::credential::ApiKeyCredential { key })
            }),
            Strategy::DeviceFlow => self
                .env
                .access_token(id)
                .map(|token| Credential::OAuth(OAuthCredential::from_access_token(token))),
            Strategy::None => None,
        }
    }

    fn device_flow(
        &self,
        config: &ProviderAuthConfig,
        cancel: &CancellationToken,
    ) -> Result<DeviceFlowAuth, AuthError> {
        let endpoints = config.device_flow.clone().ok_or_else(|| {
            AuthError::authentication(
                &config.provider_id,
                "provider has no device flow endpoints configured",
            )
        })?;
        Ok(DeviceFlowAuth::new(endpoints, self.transport.clone())
            .with_events(self.events.clone())
            .with_settings(self.settings.clone())
            .with_cancellation(cancel.clone()))
    }

    fn strategy(
        &self,
        config: &ProviderAuthConfig,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AuthStrategy>, AuthError> {
        Ok(match config.strategy {
            Strategy::ApiKey => Box::new(
                ApiKeyAuth::new(self.prompt.clone()).with_key_prefix(config.key_prefix.clone()),
            ),
            Strategy::DeviceFlow => Box::new(self.device_flow(config, cancel)?),
            Strategy::None => Box::new(NoAuth),
        })
    }

    /// Refreshes `oauth` and writes the result back. Caller holds the lock.
    async fn refresh_stored(
        &self,
        config: &ProviderAuthConfig,
        oauth: &OAuthCredential,
    ) -> Result<Credential, AuthError> {
        let id = config.provider_id.as_str();
        let refreshed = self
            .device_flow(config, &CancellationToken::new())?
            .refresh(id, oauth)
            .await?;
        let credential = Credential::OAuth(refreshed);
        self.persist(id, &credential);
        Ok(credential)
    }

    /// Runs the strategy and writes the result back. Caller holds the lock.
    async fn acquire(
        &self,
        config: &ProviderAuthConfig,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let id = config.provider_id.as_str();
        debug!("Acquiring {} credential for {}", config.strategy.as_str(), id);
        let credential = self.strategy(config, cancel)?.acquire(id).await?;
        self.persist(id, &credential);
        Ok(credential)
    }

    fn persist(&self, provider: &str, credential: &Credential) {
        // The credential is still usable for this call.
        if let Err(e) = self.store.set(provider, credential) {
            warn!("Could not save credential for {}: {}", provider, e);
        }
    }
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("registry", &self.registry)
            .field("env", &self.env)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::BEARER;
    use crate::auth::device_flow::tests::{grant, ScriptedTransport};
    use crate::auth::store::MemoryCredentialStore;
    use crate::auth::transport::PollResponse;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use secrecy::{ExposeSecret, SecretString};

    struct FixedPrompt(&'static str);

    #[async_trait]
    impl ApiKeyPrompt for FixedPrompt {
        async fn prompt(&self, _provider: &str) -> Result<Option<SecretString>, AuthError> {
            Ok(Some(SecretString::new(self.0.to_string())))
        }
    }

    struct PanicPrompt;

    #[async_trait]
    impl ApiKeyPrompt for PanicPrompt {
        async fn prompt(&self, provider: &str) -> Result<Option<SecretString>, AuthError> {
            panic!("prompted for {}", provider);
        }
    }

    struct Harness {
        resolver: AuthResolver,
        store: Arc<MemoryCredentialStore>,
        transport: Arc<ScriptedTransport>,
    }

    fn harness(
        env: EnvironmentResolver,
        transport: ScriptedTransport,
        prompt: Arc<dyn ApiKeyPrompt>,
    ) -> Harness {
        let store = Arc::new(MemoryCredentialStore::new());
        let transport = Arc::new(transport);
        let resolver = AuthResolver::builder(ProviderRegistry::builtin())
            .env(env)
            .store(store.clone())
            .transport(transport.clone())
            .prompt(prompt)
            .build()
            .unwrap();
        Harness {
            resolver,
            store,
            transport,
        }
    }

    fn oauth(access: &str, refresh: Option<&str>, expires_in_secs: i64) -> Credential {
        Credential::OAuth(OAuthCredential {
            access_token: SecretString::new(access.to_string()),
            refresh_token: refresh.map(|r| SecretString::new(r.to_string())),
            expires_at: Utc
                .timestamp_opt(Utc::now().timestamp() + expires_in_secs, 0)
                .unwrap(),
            token_type: BEARER.to_string(),
        })
    }

    fn access_token(credential: &Credential) -> String {
        credential.bearer().unwrap().expose_secret().clone()
    }

    #[tokio::test]
    async fn test_env_wins_over_store_and_strategy() {
        let h = harness(
            EnvironmentResolver::from_map([("MODELFORGE_OPENAI_API_KEY", "sk-from-env")]),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        h.store.set("openai", &Credential::api_key("sk-stored")).unwrap();

        let credential = h.resolver.resolve("openai").await.unwrap();
        assert_eq!(credential, Credential::api_key("sk-from-env"));
        assert_eq!(h.store.get("openai"), Some(Credential::api_key("sk-stored")));
    }

    #[tokio::test]
    async fn test_copilot_env_token_needs_no_network() {
        let h = harness(
            EnvironmentResolver::from_map([("MODELFORGE_GITHUB_COPILOT_ACCESS_TOKEN", "ghu_abc")]),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );

        let credential = h.resolver.resolve("github-copilot").await.unwrap();
        let oauth = credential.as_oauth().unwrap();
        assert_eq!(oauth.access_token.expose_secret(), "ghu_abc");
        assert!(!oauth.is_expired());
        assert_eq!(h.transport.network_calls(), 0);
        assert!(h.store.get("github-copilot").is_none());
    }

    #[tokio::test]
    async fn test_alias_resolves_to_canonical_provider() {
        let h = harness(
            EnvironmentResolver::from_map([("MODELFORGE_GITHUB_COPILOT_ACCESS_TOKEN", "ghu_abc")]),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        let credential = h.resolver.resolve("Copilot").await.unwrap();
        assert_eq!(access_token(&credential), "ghu_abc");
    }

    #[tokio::test]
    async fn test_valid_stored_credential_is_used() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        let stored = oauth("ghu_stored", Some("ghr"), 3600);
        h.store.set("github-copilot", &stored).unwrap();

        assert_eq!(h.resolver.resolve("github-copilot").await.unwrap(), stored);
        assert_eq!(h.transport.network_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_without_refresh_token_runs_strategy() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(vec![Ok(PollResponse::Granted(grant("ghu_fresh")))]),
            Arc::new(PanicPrompt),
        );
        h.store
            .set("github-copilot", &oauth("ghu_stale", None, -60))
            .unwrap();

        let credential = h.resolver.resolve("github-copilot").await.unwrap();
        assert_eq!(access_token(&credential), "ghu_fresh");
        assert_eq!(*h.transport.code_requests.lock().unwrap(), 1);
        assert_eq!(*h.transport.refresh_calls.lock().unwrap(), 0);
        assert_eq!(h.store.get("github-copilot"), Some(credential));
    }

    #[tokio::test]
    async fn test_expired_with_refresh_token_is_refreshed_silently() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()).with_refreshes(vec![Ok(grant("ghu_refreshed"))]),
            Arc::new(PanicPrompt),
        );
        h.store
            .set("github-copilot", &oauth("ghu_stale", Some("ghr"), -60))
            .unwrap();

        let credential = h.resolver.resolve("github-copilot").await.unwrap();
        assert_eq!(access_token(&credential), "ghu_refreshed");
        assert_eq!(*h.transport.code_requests.lock().unwrap(), 0);
        assert_eq!(h.store.get("github-copilot"), Some(credential));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_falls_through_to_strategy() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(vec![Ok(PollResponse::Granted(grant("ghu_fresh")))])
                .with_refreshes(vec![Err(AuthError::authentication("token", "invalid_grant"))]),
            Arc::new(PanicPrompt),
        );
        h.store
            .set("github-copilot", &oauth("ghu_stale", Some("ghr"), -60))
            .unwrap();

        let credential = h.resolver.resolve("github-copilot").await.unwrap();
        assert_eq!(access_token(&credential), "ghu_fresh");
        assert_eq!(*h.transport.refresh_calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_device_code_is_authentication_error() {
        let mut transport = ScriptedTransport::new(Vec::new());
        transport.expires_in = 20;
        let h = harness(EnvironmentResolver::empty(), transport, Arc::new(PanicPrompt));

        let err = h.resolver.resolve("github-copilot").await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
        assert!(h.store.get("github-copilot").is_none());
    }

    #[tokio::test]
    async fn test_api_key_from_prompt_is_stored() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(FixedPrompt("sk-typed")),
        );
        let credential = h.resolver.resolve("openai").await.unwrap();
        assert_eq!(credential, Credential::api_key("sk-typed"));
        assert_eq!(h.store.get("openai"), Some(credential));
    }

    #[tokio::test]
    async fn test_no_source_is_authentication_error() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(NoPrompt),
        );
        let err = h.resolver.resolve("anthropic").await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
        assert!(h.store.list().is_empty());
    }

    #[tokio::test]
    async fn test_no_auth_provider() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        assert_eq!(h.resolver.resolve("ollama").await.unwrap(), Credential::None);
        assert_eq!(
            h.resolver.status("ollama").unwrap(),
            CredentialSource::NotRequired
        );
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        assert!(matches!(
            h.resolver.resolve("nope").await,
            Err(AuthError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_skips_network_when_token_is_fresh() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        let stored = oauth("ghu_current", Some("ghr"), 3600);
        h.store.set("github-copilot", &stored).unwrap();

        assert_eq!(h.resolver.refresh("github-copilot").await.unwrap(), stored);
        assert_eq!(h.transport.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_near_expiry() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()).with_refreshes(vec![Ok(grant("ghu_next"))]),
            Arc::new(PanicPrompt),
        );
        h.store
            .set("github-copilot", &oauth("ghu_current", Some("ghr"), 30))
            .unwrap();

        let credential = h.resolver.refresh("github-copilot").await.unwrap();
        assert_eq!(access_token(&credential), "ghu_next");
        let expires_at = credential.as_oauth().unwrap().expires_at;
        assert!(expires_at > Utc::now() + Duration::seconds(3000));
    }

    #[tokio::test]
    async fn test_reacquire_forces_refresh() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()).with_refreshes(vec![Ok(grant("ghu_next"))]),
            Arc::new(PanicPrompt),
        );
        let stale = oauth("ghu_revoked", Some("ghr"), 3600);
        h.store.set("github-copilot", &stale).unwrap();

        let credential = h.resolver.reacquire("github-copilot", &stale).await.unwrap();
        assert_eq!(access_token(&credential), "ghu_next");
        assert_eq!(*h.transport.refresh_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reacquire_returns_concurrent_replacement() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        let stale = oauth("ghu_old", Some("ghr"), 3600);
        let replacement = oauth("ghu_new", Some("ghr"), 3600);
        h.store.set("github-copilot", &replacement).unwrap();

        let credential = h.resolver.reacquire("github-copilot", &stale).await.unwrap();
        assert_eq!(credential, replacement);
        assert_eq!(h.transport.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_reacquire_api_key_prompts_again() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(Vec::new()),
            Arc::new(FixedPrompt("sk-new")),
        );
        let stale = Credential::api_key("sk-old");
        h.store.set("openai", &stale).unwrap();

        let credential = h.resolver.reacquire("openai", &stale).await.unwrap();
        assert_eq!(credential, Credential::api_key("sk-new"));
        assert_eq!(h.store.get("openai"), Some(credential));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resolves_share_one_login() {
        let h = harness(
            EnvironmentResolver::empty(),
            ScriptedTransport::new(vec![Ok(PollResponse::Granted(grant("ghu_once")))]),
            Arc::new(PanicPrompt),
        );

        let (a, b) = tokio::join!(
            h.resolver.resolve("github-copilot"),
            h.resolver.resolve("copilot")
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(*h.transport.code_requests.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_and_logout() {
        let h = harness(
            EnvironmentResolver::from_map([("MODELFORGE_ANTHROPIC_API_KEY", "sk-ant-env")]),
            ScriptedTransport::new(Vec::new()),
            Arc::new(PanicPrompt),
        );
        assert_eq!(
            h.resolver.status("anthropic").unwrap(),
            CredentialSource::Environment
        );
        assert_eq!(
            h.resolver.status("openai").unwrap(),
            CredentialSource::NotConfigured
        );

        h.store
            .set("github-copilot", &oauth("ghu", None, -5))
            .unwrap();
        assert_eq!(
            h.resolver.status("copilot").unwrap(),
            CredentialSource::Stored {
                kind: "oauth",
                expired: true
            }
        );

        assert!(h.resolver.logout("copilot").await.unwrap());
        assert!(!h.resolver.logout("copilot").await.unwrap());
        assert_eq!(
            h.resolver.status("copilot").unwrap(),
            CredentialSource::NotConfigured
        );
    }
}
