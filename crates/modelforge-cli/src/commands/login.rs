use anyhow::{Context, Result};
use modelforge_core::Credential;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::Cli;

/// Execute the login command
///
/// Runs the provider's acquisition strategy even if a credential is
/// already stored, and replaces the stored one on success. Ctrl-C
/// cancels a pending device authorization.
pub async fn execute(cli: &Cli, provider: &str, open_browser: bool) -> Result<()> {
    let config = super::load(cli)?;
    let resolver = super::resolver(&config, open_browser)?;
    info!("Starting login for {}", provider);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling login");
            on_interrupt.cancel();
        }
    });

    let result = resolver.login(provider, &cancel).await;
    watcher.abort();
    let credential = result.with_context(|| format!("Login to {} failed", provider))?;

    match &credential {
        Credential::ApiKey(_) => println!("API key for {} saved.", provider),
        Credential::OAuth(oauth) => println!(
            "Logged in to {} (token valid until {}).",
            provider,
            oauth.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Credential::None => println!("{} does not require a credential.", provider),
    }
    Ok(())
}

/// Execute the logout command
pub async fn logout(cli: &Cli, provider: &str) -> Result<()> {
    let config = super::load(cli)?;
    let resolver = super::resolver(&config, false)?;

    if resolver.logout(provider).await? {
        println!("Removed stored credential for {}.", provider);
    } else {
        println!("No stored credential for {}.", provider);
    }
    Ok(())
}
