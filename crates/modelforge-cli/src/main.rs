use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use modelforge_cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    debug!("Starting modelforge v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Login {
            provider,
            no_browser,
        } => commands::login::execute(&cli, provider, !no_browser).await,
        Commands::Logout { provider } => commands::login::logout(&cli, provider).await,
        Commands::Status { provider } => commands::status::execute(&cli, provider.as_deref()),
        Commands::Chat {
            provider,
            model,
            system,
            prompt,
        } => {
            commands::chat::execute(
                &cli,
                provider,
                model.as_deref(),
                system.as_deref(),
                prompt.as_deref(),
            )
            .await
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
