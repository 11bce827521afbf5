//! Configuration types for provider authentication

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How a provider obtains credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ApiKey,
    DeviceFlow,
    None,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ApiKey => "api_key",
            Strategy::DeviceFlow => "device_flow",
            Strategy::None => "none",
        }
    }
}

/// OAuth2 device-authorization endpoints of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFlowEndpoints {
    pub authorization_url: String,
    pub token_url: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Authentication settings for a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAuthConfig {
    /// Filled from the `[providers.<id>]` table key.
    #[serde(skip)]
    pub provider_id: String,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_flow: Option<DeviceFlowEndpoints>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Expected API key prefix; a mismatch is only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

impl ProviderAuthConfig {
    fn with_strategy(provider_id: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            provider_id: provider_id.into(),
            strategy,
            device_flow: None,
            aliases: Vec::new(),
            base_url: None,
            default_model: None,
            key_prefix: None,
        }
    }

    /// A provider authenticated with a static API key.
    pub fn api_key(provider_id: impl Into<String>) -> Self {
        Self::with_strategy(provider_id, Strategy::ApiKey)
    }

    /// A provider authenticated through the OAuth2 device flow.
    pub fn device_flow(provider_id: impl Into<String>, endpoints: DeviceFlowEndpoints) -> Self {
        let mut config = Self::with_strategy(provider_id, Strategy::DeviceFlow);
        config.device_flow = Some(endpoints);
        config
    }

    /// A provider that needs no credential.
    pub fn none(provider_id: impl Into<String>) -> Self {
        Self::with_strategy(provider_id, Strategy::None)
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Device flow providers must carry their endpoints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy == Strategy::DeviceFlow && self.device_flow.is_none() {
            return Err(ConfigError::Invalid(format!(
                "provider {} uses device_flow but has no [device_flow] endpoints",
                self.provider_id
            )));
        }
        Ok(())
    }
}

/// Tunables for token handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Refresh an OAuth token proactively when it expires within this window.
    pub refresh_margin_secs: u64,
    /// HTTP timeout for token endpoint calls.
    pub token_timeout_secs: u64,
    /// Attempts per poll/refresh request before giving up on the network.
    pub network_retries: u32,
    /// Fixed backoff between network attempts.
    pub network_backoff_ms: u64,
    /// Interval increase applied on `slow_down`.
    pub slow_down_increment_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_dir: Option<PathBuf>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 60,
            token_timeout_secs: 10,
            network_retries: 3,
            network_backoff_ms: 1000,
            slow_down_increment_secs: 5,
            credentials_dir: None,
        }
    }
}

impl AuthSettings {
    pub fn refresh_margin(&self) -> chrono::Duration {
        // Capped at one day.
        chrono::Duration::seconds(self.refresh_margin_secs.min(86_400) as i64)
    }

    pub fn token_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.token_timeout_secs.max(1))
    }

    pub fn network_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.network_backoff_ms)
    }

    pub fn slow_down_increment(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.slow_down_increment_secs.max(1))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderAuthConfig>,
    /// Whether the config was loaded from the default location
    #[serde(skip)]
    pub is_from_default_location: bool,
}

impl Default for Config {
    fn default() -> Self {
        let providers = builtin_providers()
            .into_iter()
            .map(|p| (p.provider_id.clone(), p))
            .collect();
        Self {
            auth: AuthSettings::default(),
            providers,
            is_from_default_location: false,
        }
    }
}

impl Config {
    /// Parses TOML and layers it over the built-in providers.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let parsed: Config = toml::from_str(content)?;
        let mut config = Config {
            auth: parsed.auth,
            ..Config::default()
        };
        for (id, mut provider) in parsed.providers {
            provider.provider_id = id.to_ascii_lowercase();
            provider.validate()?;
            config.providers.insert(provider.provider_id.clone(), provider);
        }
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Provider lookup table built from this configuration.
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers.clone(),
        }
    }

    /// Add or replace a provider entry.
    pub fn insert_provider(&mut self, provider: ProviderAuthConfig) {
        self.providers.insert(provider.provider_id.clone(), provider);
    }
}

/// Provider configs keyed by canonical id, with alias lookup.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderAuthConfig>,
}

impl ProviderRegistry {
    /// Registry holding only the built-in providers.
    pub fn builtin() -> Self {
        Config::default().registry()
    }

    /// Registry holding exactly `providers`.
    pub fn from_providers<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = ProviderAuthConfig>,
    {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.provider_id.clone(), p))
                .collect(),
        }
    }

    /// Canonical provider id for `name`: lowercased, aliases followed.
    pub fn canonical(&self, name: &str) -> Option<String> {
        let name = name.trim().to_ascii_lowercase();
        if self.providers.contains_key(&name) {
            return Some(name);
        }
        self.providers
            .values()
            .find(|p| p.aliases.iter().any(|a| a.eq_ignore_ascii_case(&name)))
            .map(|p| p.provider_id.clone())
    }

    /// Get a provider by id or alias
    pub fn get(&self, name: &str) -> Option<&ProviderAuthConfig> {
        let id = self.canonical(name)?;
        self.providers.get(&id)
    }

    /// All canonical provider ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn insert(&mut self, provider: ProviderAuthConfig) {
        self.providers.insert(provider.provider_id.clone(), provider);
    }
}

/// The providers modelforge knows about without any configuration.
pub fn builtin_providers() -> Vec<ProviderAuthConfig> {
    vec![
        ProviderAuthConfig::api_key("openai")
            .with_base_url("https://api.openai.com/v1")
            .with_default_model("gpt-4o-mini")
            .with_key_prefix("sk-"),
        ProviderAuthConfig::api_key("anthropic")
            .with_base_url("https://api.anthropic.com/v1")
            .with_default_model("claude-3-5-sonnet-latest")
            .with_key_prefix("sk-ant-")
            .with_aliases(["claude"]),
        ProviderAuthConfig::device_flow(
            "github-copilot",
            DeviceFlowEndpoints {
                authorization_url: "https://github.com/login/device/code".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                client_id: "Iv1.b507a08c87ecfe98".to_string(),
                scope: Some("read:user".to_string()),
            },
        )
        .with_base_url("https://api.githubcopilot.com")
        .with_default_model("gpt-4o")
        .with_aliases(["copilot"]),
        ProviderAuthConfig::none("ollama")
            .with_base_url("http://localhost:11434/v1")
            .with_default_model("llama3.1"),
    ]
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("modelforge").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".modelforge/config.toml"))
}

/// Load configuration from the default location or specified path
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (path, is_default) = match path {
        Some(p) => (p.to_path_buf(), false),
        None => (default_config_path(), true),
    };

    let mut config = if path.exists() {
        tracing::debug!("Loading config from {:?}", path);
        Config::from_file(&path)?
    } else if is_default {
        Config::default()
    } else {
        return Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("config file not found: {}", path.display()),
        )));
    };

    config.is_from_default_location = is_default;
    Ok(config)
}

/// Save configuration to the default location or specified path
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.to_file(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.get("openai").unwrap().strategy, Strategy::ApiKey);
        assert_eq!(registry.get("ollama").unwrap().strategy, Strategy::None);
        let copilot = registry.get("github-copilot").unwrap();
        assert_eq!(copilot.strategy, Strategy::DeviceFlow);
        assert!(copilot.device_flow.is_some());
    }

    #[test]
    fn test_alias_resolution() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.canonical("copilot").as_deref(), Some("github-copilot"));
        assert_eq!(registry.canonical("Copilot").as_deref(), Some("github-copilot"));
        assert_eq!(registry.canonical(" OPENAI ").as_deref(), Some("openai"));
        assert!(registry.canonical("nope").is_none());
    }

    #[test]
    fn test_toml_overrides_and_extends_builtins() {
        let config = Config::from_toml(
            r#"
[auth]
refresh_margin_secs = 120

[providers.openai]
strategy = "api_key"
base_url = "https://proxy.internal/v1"

[providers.acme]
strategy = "device_flow"
aliases = ["acme-ai"]

[providers.acme.device_flow]
authorization_url = "https://auth.acme.test/device"
token_url = "https://auth.acme.test/token"
client_id = "acme-cli"
"#,
        )
        .unwrap();

        let registry = config.registry();
        assert_eq!(config.auth.refresh_margin_secs, 120);
        assert_eq!(config.auth.token_timeout_secs, 10);
        assert_eq!(
            registry.get("openai").unwrap().base_url.as_deref(),
            Some("https://proxy.internal/v1")
        );
        let acme = registry.get("acme-ai").unwrap();
        assert_eq!(acme.provider_id, "acme");
        assert_eq!(acme.device_flow.as_ref().unwrap().client_id, "acme-cli");
        assert!(registry.get("github-copilot").is_some());
    }

    #[test]
    fn test_device_flow_without_endpoints_is_rejected() {
        let err = Config::from_toml(
            r#"
[providers.broken]
strategy = "device_flow"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.auth.network_retries = 5;
        save_config(&config, Some(&path)).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.auth.network_retries, 5);
        assert_eq!(loaded.providers.len(), config.providers.len());
        assert!(!loaded.is_from_default_location);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
