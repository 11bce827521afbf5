use anyhow::Result;
use modelforge_core::auth::EnvironmentResolver;
use modelforge_core::{CredentialSource, ProviderAuthConfig, Strategy};
use nu_ansi_term::Color;

use crate::cli::Cli;

/// Execute the status command. Makes no network calls.
pub fn execute(cli: &Cli, provider: Option<&str>) -> Result<()> {
    let config = super::load(cli)?;
    let resolver = super::resolver(&config, false)?;
    let registry = resolver.registry();

    let ids: Vec<String> = match provider {
        Some(name) => vec![
            registry
                .canonical(name)
                .ok_or_else(|| anyhow::anyhow!("unknown provider: {}", name))?,
        ],
        None => registry.ids().map(str::to_string).collect(),
    };

    for id in ids {
        let Some(provider_config) = registry.get(&id) else {
            continue;
        };
        let source = resolver.status(&id)?;
        println!(
            "{:<16} {:<12} {}",
            id,
            provider_config.strategy.as_str(),
            paint(source, &describe(source, provider_config))
        );
    }
    Ok(())
}

fn paint(source: CredentialSource, text: &str) -> String {
    let color = match source {
        CredentialSource::Environment | CredentialSource::NotRequired => Color::Green,
        CredentialSource::Stored { expired: false, .. } => Color::Green,
        CredentialSource::Stored { expired: true, .. } => Color::Yellow,
        CredentialSource::NotConfigured => Color::Red,
    };
    color.paint(text).to_string()
}

/// One-line description of where a credential comes from.
pub fn describe(source: CredentialSource, provider: &ProviderAuthConfig) -> String {
    let id = provider.provider_id.as_str();
    match source {
        CredentialSource::Environment => {
            let var = match provider.strategy {
                Strategy::DeviceFlow => EnvironmentResolver::access_token_var(id),
                _ => EnvironmentResolver::api_key_var(id),
            };
            format!("from environment ({})", var)
        }
        CredentialSource::Stored {
            kind,
            expired: false,
        } => format!("stored {}", kind),
        CredentialSource::Stored { kind, expired: true } => {
            format!("stored {} (expired, will refresh or re-login)", kind)
        }
        CredentialSource::NotConfigured => format!("not configured; run `modelforge login {}`", id),
        CredentialSource::NotRequired => "no credential required".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelforge_core::ProviderRegistry;

    #[test]
    fn test_describe_names_env_var() {
        let registry = ProviderRegistry::builtin();
        let copilot = registry.get("copilot").unwrap();
        assert_eq!(
            describe(CredentialSource::Environment, copilot),
            "from environment (MODELFORGE_GITHUB_COPILOT_ACCESS_TOKEN)"
        );
        let openai = registry.get("openai").unwrap();
        assert_eq!(
            describe(CredentialSource::Environment, openai),
            "from environment (MODELFORGE_OPENAI_API_KEY)"
        );
    }

    #[test]
    fn test_describe_other_sources() {
        let registry = ProviderRegistry::builtin();
        let openai = registry.get("openai").unwrap();
        assert_eq!(
            describe(CredentialSource::NotConfigured, openai),
            "not configured; run `modelforge login openai`"
        );
        assert!(describe(
            CredentialSource::Stored {
                kind: "oauth",
                expired: true
            },
            openai
        )
        .contains("expired"));
    }
}
