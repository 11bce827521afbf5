//! Command implementations for the modelforge CLI

pub mod chat;
pub mod login;
pub mod status;

use anyhow::{Context, Result};
use modelforge_core::{load_config, AuthResolver, Config};
use std::sync::Arc;

use crate::cli::Cli;
use crate::console::{ConsoleSink, StdinPrompt};

/// Loads the configuration selected on the command line.
pub fn load(cli: &Cli) -> Result<Config> {
    load_config(cli.config_file.as_deref()).context("Failed to load config")
}

/// Resolver wired to the terminal for prompts and progress.
pub fn resolver(config: &Config, open_browser: bool) -> Result<AuthResolver> {
    AuthResolver::from_config(config)
        .prompt(Arc::new(StdinPrompt))
        .events(Arc::new(ConsoleSink::new(open_browser)))
        .build()
        .context("Failed to set up credential resolution")
}
