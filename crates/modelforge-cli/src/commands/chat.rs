use anyhow::{bail, Result};
use forge_llm::Message;
use futures::StreamExt;
use modelforge_core::ModelHandle;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::debug;

use crate::cli::Cli;

/// Execute the chat command: one prompt, streamed answer on stdout.
pub async fn execute(
    cli: &Cli,
    provider: &str,
    model: Option<&str>,
    system: Option<&str>,
    prompt: Option<&str>,
) -> Result<()> {
    let prompt = match prompt {
        Some(p) => p.to_string(),
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            input
        }
    };
    let prompt = prompt.trim();
    if prompt.is_empty() {
        bail!("No input provided. Pass a prompt or pipe input.");
    }

    let config = super::load(cli)?;
    let resolver = Arc::new(super::resolver(&config, true)?);
    let handle = ModelHandle::for_provider(resolver, provider, model)?;
    debug!("Chatting with {} via {}", handle.model_name(), handle.provider());

    let messages = [Message::user(prompt)];
    let mut stream = handle.stream(system, &messages);
    let mut stdout = io::stdout();
    while let Some(chunk) = stream.next().await {
        write!(stdout, "{}", chunk?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
