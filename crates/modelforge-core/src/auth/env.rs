//! Environment variable lookup for provider credentials

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;

/// Prefix of every credential environment variable.
pub const ENV_PREFIX: &str = "MODELFORGE";

/// Reads `MODELFORGE_<P>_API_KEY` / `MODELFORGE_<P>_ACCESS_TOKEN`.
///
/// The lookup source is injected so tests can supply a fixed mapping
/// instead of mutating the process environment.
#[derive(Clone)]
pub struct EnvironmentResolver {
    source: EnvSource,
}

#[derive(Clone)]
enum EnvSource {
    Process,
    Fixed(Arc<HashMap<String, String>>),
}

impl EnvironmentResolver {
    /// Reads from the real process environment.
    pub fn from_process() -> Self {
        Self {
            source: EnvSource::Process,
        }
    }

    /// Reads from a fixed map.
    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<HashMap<_, _>>();
        Self {
            source: EnvSource::Fixed(Arc::new(vars)),
        }
    }

    /// An empty environment.
    pub fn empty() -> Self {
        Self::from_map(std::iter::empty::<(String, String)>())
    }

    /// `github-copilot` -> `GITHUB_COPILOT`.
    pub fn normalize(provider: &str) -> String {
        provider
            .trim()
            .chars()
            .map(|c| match c {
                '-' | '.' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }

    /// Name of the API key variable for `provider`.
    pub fn api_key_var(provider: &str) -> String {
        format!("{}_{}_API_KEY", ENV_PREFIX, Self::normalize(provider))
    }

    /// Name of the access token variable for `provider`.
    pub fn access_token_var(provider: &str) -> String {
        format!("{}_{}_ACCESS_TOKEN", ENV_PREFIX, Self::normalize(provider))
    }

    /// API key for `provider`, if set and non-blank.
    pub fn api_key(&self, provider: &str) -> Option<SecretString> {
        self.var(&Self::api_key_var(provider)).map(SecretString::new)
    }

    /// Access token for `provider`, if set and non-blank.
    pub fn access_token(&self, provider: &str) -> Option<SecretString> {
        self.var(&Self::access_token_var(provider)).map(SecretString::new)
    }

    /// Raw lookup; blank values count as unset.
    pub fn var(&self, name: &str) -> Option<String> {
        let value = match &self.source {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(map) => map.get(name).cloned(),
        }?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl Default for EnvironmentResolver {
    fn default() -> Self {
        Self::from_process()
    }
}

impl std::fmt::Debug for EnvironmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            EnvSource::Process => "process",
            EnvSource::Fixed(_) => "fixed",
        };
        f.debug_struct("EnvironmentResolver")
            .field("source", &source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_normalize() {
        assert_eq!(EnvironmentResolver::normalize("github-copilot"), "GITHUB_COPILOT");
        assert_eq!(EnvironmentResolver::normalize("openai"), "OPENAI");
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(
            EnvironmentResolver::api_key_var("openai"),
            "MODELFORGE_OPENAI_API_KEY"
        );
        assert_eq!(
            EnvironmentResolver::access_token_var("github-copilot"),
            "MODELFORGE_GITHUB_COPILOT_ACCESS_TOKEN"
        );
    }

    #[test]
    fn test_fixed_map_lookup() {
        let env = EnvironmentResolver::from_map([
            ("MODELFORGE_GITHUB_COPILOT_ACCESS_TOKEN", "ghu_abc"),
            ("MODELFORGE_OPENAI_API_KEY", "   "),
        ]);
        assert_eq!(
            env.access_token("github-copilot").unwrap().expose_secret(),
            "ghu_abc"
        );
        assert!(env.api_key("openai").is_none());
        assert!(env.api_key("anthropic").is_none());
    }

    #[test]
    fn test_debug_does_not_print_values() {
        let env = EnvironmentResolver::from_map([("MODELFORGE_OPENAI_API_KEY", "sk-secret")]);
        assert!(!format!("{:?}", env).contains("sk-secret"));
    }
}
