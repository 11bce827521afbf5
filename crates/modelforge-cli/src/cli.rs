use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// modelforge - authenticated access to language model providers
#[derive(Parser, Debug, Clone)]
#[command(name = "modelforge")]
#[command(about = "Log in to model providers and chat with their models")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Obtain and store a credential for a provider
    Login {
        /// Provider id or alias (e.g. openai, copilot)
        provider: String,
        /// Do not try to open the verification URL in a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Remove the stored credential for a provider
    Logout {
        /// Provider id or alias
        provider: String,
    },
    /// Show where each provider's credential comes from
    Status {
        /// Only show this provider
        provider: Option<String>,
    },
    /// Send a single prompt and stream the answer
    Chat {
        /// Provider id or alias
        provider: String,
        /// Model to use instead of the provider default
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,
        /// System prompt
        #[arg(short, long, value_name = "TEXT")]
        system: Option<String>,
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_parsing() {
        let cli = Cli::parse_from(["modelforge", "login", "copilot", "--no-browser"]);
        match cli.command {
            Commands::Login {
                provider,
                no_browser,
            } => {
                assert_eq!(provider, "copilot");
                assert!(no_browser);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["modelforge", "status", "-v", "--config-file", "/tmp/c.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config_file, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Status { provider: None }));
    }

    #[test]
    fn test_chat_parsing() {
        let cli = Cli::parse_from([
            "modelforge",
            "chat",
            "ollama",
            "-m",
            "llama3.1",
            "-s",
            "Be brief",
            "Hello",
        ]);
        match cli.command {
            Commands::Chat {
                provider,
                model,
                system,
                prompt,
            } => {
                assert_eq!(provider, "ollama");
                assert_eq!(model.as_deref(), Some("llama3.1"));
                assert_eq!(system.as_deref(), Some("Be brief"));
                assert_eq!(prompt.as_deref(), Some("Hello"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["modelforge"]).is_err());
    }
}
