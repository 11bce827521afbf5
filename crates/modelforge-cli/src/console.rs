//! Terminal side of authentication: event display and key prompt

use async_trait::async_trait;
use modelforge_core::auth::ApiKeyPrompt;
use modelforge_core::{AuthError, AuthEvent, AuthEventSink};
use nu_ansi_term::Color;
use secrecy::SecretString;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::warn;

/// Prints auth progress to stderr, optionally opening the browser.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    pub open_browser: bool,
}

impl ConsoleSink {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

impl AuthEventSink for ConsoleSink {
    fn emit(&self, event: AuthEvent) {
        let mut err = io::stderr().lock();
        // Nothing sensible to do if stderr is gone.
        let _ = match event {
            AuthEvent::Info { message } => writeln!(err, "{}", message),
            AuthEvent::Waiting { message } => writeln!(err, "{}", Color::DarkGray.paint(message)),
            AuthEvent::Error { message } => writeln!(err, "{} {}", Color::Red.paint("Error:"), message),
            AuthEvent::Success { message } => writeln!(err, "{}", Color::Green.paint(message)),
            AuthEvent::VerificationUrl { url, user_code } => {
                let _ = writeln!(err, "\nPlease visit the following URL to authorize:");
                let _ = writeln!(err, "  URL:  {}", Color::Cyan.paint(&url));
                let _ = writeln!(err, "  Code: {}\n", Color::Yellow.bold().paint(&user_code));
                if self.open_browser {
                    if let Err(e) = open::that(&url) {
                        warn!("Failed to open browser: {}", e);
                        let _ = writeln!(err, "Please open the URL manually in your browser.");
                    }
                }
                Ok(())
            }
        };
    }
}

/// Reads an API key from an interactive stdin.
///
/// Yields nothing when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl ApiKeyPrompt for StdinPrompt {
    async fn prompt(&self, provider: &str) -> Result<Option<SecretString>, AuthError> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }
        let provider = provider.to_string();
        let line = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut err = io::stderr().lock();
            write!(err, "Enter API key for {}: ", provider)?;
            err.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| AuthError::Validation(format!("key prompt failed: {}", e)))??;

        // Blank input is left for validation to reject.
        Ok(Some(SecretString::new(line.trim().to_string())))
    }
}
